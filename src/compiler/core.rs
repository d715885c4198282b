use std::collections::HashSet;

use tracing::{debug, info};

use crate::cache::{DocumentStore, GraphPayloadCache};
use crate::compiler::edge_lookup::EdgeLookup;
use crate::compiler::flow::FlowStepBuilder;
use crate::error::ConfigurationError;
use crate::graph::GraphModel;
use crate::plan::{ParamEntry, SignalUsage, StepState, TaskDetail, TaskNode, TaskTree};

/// 一次编译的输入上下文。
#[derive(Debug, Clone)]
pub struct CompileContext {
    /// 宿主侧的父任务 id 前缀（必填；缺失视为配置错误）。
    pub parent_id: String,
    /// 模板上下文 id（决定 task_type 与 target_id）。
    pub template_id: Option<String>,
    /// 实例上下文 id。
    pub instance_id: Option<String>,
    /// 图根的层级（子图递归时逐级 +1）。
    pub level: u8,
}

impl CompileContext {
    pub fn for_parent(parent_id: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            template_id: None,
            instance_id: None,
            level: 3,
        }
    }

    fn task_type(&self) -> &'static str {
        if self.template_id.is_some() {
            "template"
        } else if self.instance_id.is_some() {
            "instance"
        } else {
            "graph"
        }
    }

    fn target_id(&self, graph_id: &str) -> String {
        self.template_id
            .clone()
            .or_else(|| self.instance_id.clone())
            .unwrap_or_else(|| graph_id.to_string())
    }
}

/// 一次编译的产物：有序根 id（复合步骤在前，图根最后）与本次生成的全部 id。
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub root_ids: Vec<String>,
    pub graph_root_id: String,
    pub created_ids: Vec<String>,
    /// 提交成功后要写入负载缓存的 (图根 id, 图文档) 对。
    payloads: Vec<(String, GraphModel)>,
}

/// 任务计划编译器：把图文档编成层级任务树。
///
/// 确定性：相同 (GraphModel, CompileContext) 两次编译产出逐字节相同的
/// 节点内容与相同的 id（复合子图按首次出现顺序展开）。
/// 重编译对已存在的 id 原位覆盖，身份保持不变。
pub struct TaskPlanCompiler<'a> {
    store: &'a dyn DocumentStore,
    cache: Option<&'a GraphPayloadCache>,
}

impl<'a> TaskPlanCompiler<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store, cache: None }
    }

    pub fn with_cache(store: &'a dyn DocumentStore, cache: &'a GraphPayloadCache) -> Self {
        Self { store, cache: Some(cache) }
    }

    /// 编译入口。配置错误（复合环、缺上下文、找不到复合文档）整体中止，
    /// 不向目标树提交任何部分结果。
    pub fn compile(
        &self,
        tree: &mut TaskTree,
        model: &GraphModel,
        context: &CompileContext,
    ) -> Result<CompileOutput, ConfigurationError> {
        if context.parent_id.is_empty() {
            return Err(ConfigurationError::MissingContext { field: "parent_id" });
        }

        // 孩子引用有悬空 id 时强制整树重建
        let dangling = tree.dangling_children();
        if !dangling.is_empty() {
            info!(count = dangling.len(), "dangling child references, forcing full rebuild");
            tree.clear();
        }

        // 先在暂存树上走完全部可失败步骤，成功后才原位提交
        let mut staging = TaskTree::new();
        let mut output = CompileOutput::default();
        let mut composite_stack: Vec<String> = Vec::new();
        self.compile_into(&mut staging, &mut output, model, context, &mut composite_stack)?;

        for id in &output.created_ids {
            if let Some(node) = staging.get(id) {
                tree.upsert(node.clone());
            }
        }
        for root_id in &output.root_ids {
            tree.add_root(root_id);
        }
        if let Some(cache) = self.cache {
            for (root_id, payload) in output.payloads.drain(..) {
                let graph_id = payload.graph_id.clone();
                cache.drop_for_root(&root_id);
                cache.store(&root_id, &graph_id, payload);
            }
        }
        info!(
            graph_id = %model.graph_id,
            graph_root = %output.graph_root_id,
            created = output.created_ids.len(),
            "graph compiled"
        );
        Ok(output)
    }

    fn compile_into(
        &self,
        tree: &mut TaskTree,
        output: &mut CompileOutput,
        model: &GraphModel,
        context: &CompileContext,
        composite_stack: &mut Vec<String>,
    ) -> Result<(), ConfigurationError> {
        let edge_lookup = EdgeLookup::build(model);
        let task_type = context.task_type().to_string();

        // 1. 复合子图：按首次出现顺序，每个独立复合出一个父任务并递归编译
        let mut seen_composites: HashSet<String> = HashSet::new();
        for node in &model.nodes {
            let Some(composite_id) = node.composite_id.as_deref() else {
                continue;
            };
            if composite_id.is_empty() || !seen_composites.insert(composite_id.to_string()) {
                continue;
            }
            let composite_name = if node.title.is_empty() { composite_id } else { node.title.as_str() };
            let composite_task_id = self.compile_composite(
                tree,
                output,
                context,
                composite_id,
                composite_name,
                composite_stack,
            )?;
            output.root_ids.push(composite_task_id);
        }

        // 2. 图根：重编译复用已有 id，孩子列表总是全量重建
        let graph_root_id = format!("{}:graph:{}", context.parent_id, model.graph_id);
        let graph_data_key = self
            .cache
            .map(|_| format!("{}::{}", graph_root_id, model.graph_id));
        let mut graph_root = TaskNode {
            id: graph_root_id.clone(),
            title: format!("配置节点图：{}", model.name),
            description: "请在编辑器中打开此节点图进行配置".to_string(),
            level: context.level,
            parent_id: context.parent_id.clone(),
            children: Vec::new(),
            task_type: task_type.clone(),
            target_id: context.target_id(&model.graph_id),
            detail: TaskDetail::GraphRoot {
                graph_id: model.graph_id.clone(),
                graph_name: model.name.clone(),
                task_type: task_type.clone(),
                graph_data_key,
            },
            state: StepState::default(),
        };

        // 3. 局部变量汇总
        if !model.variables.is_empty() {
            let vars_id = format!("{graph_root_id}:variables");
            let variables = model
                .variables
                .iter()
                .map(|(name, value)| ParamEntry {
                    param_name: name.clone(),
                    param_value: value.clone(),
                    expected_type: None,
                })
                .collect();
            graph_root.children.push(vars_id.clone());
            self.push_node(
                tree,
                output,
                TaskNode {
                    id: vars_id,
                    title: "配置节点图变量".to_string(),
                    description: "设置本图的局部变量".to_string(),
                    level: context.level + 1,
                    parent_id: graph_root_id.clone(),
                    children: Vec::new(),
                    task_type: task_type.clone(),
                    target_id: model.graph_id.clone(),
                    detail: TaskDetail::GraphVariables { variables },
                    state: StepState::default(),
                },
            );
        }

        // 4. 信号使用概览（按节点声明顺序聚合，保证确定性）
        let signals = collect_signal_usage(model);
        if !signals.is_empty() {
            let signals_id = format!("{graph_root_id}:signals");
            graph_root.children.push(signals_id.clone());
            self.push_node(
                tree,
                output,
                TaskNode {
                    id: signals_id,
                    title: "检查本图使用的信号".to_string(),
                    description: "查看并确认本图中使用到的信号定义与绑定节点".to_string(),
                    level: context.level + 1,
                    parent_id: graph_root_id.clone(),
                    children: Vec::new(),
                    task_type: task_type.clone(),
                    target_id: model.graph_id.clone(),
                    detail: TaskDetail::SignalsOverview {
                        graph_id: model.graph_id.clone(),
                        signals,
                    },
                    state: StepState::default(),
                },
            );
        }

        // 5. 事件流：每个控制流入口一个流根，节点创建集合跨流共享
        let mut created: HashSet<String> = HashSet::new();
        let entries: Vec<String> = model.flow_entry_nodes().iter().map(|n| n.id.clone()).collect();
        for entry_id in entries {
            let Some(entry) = model.node(&entry_id) else {
                continue;
            };
            let plan = {
                let mut builder = FlowStepBuilder::new(model, &edge_lookup, &mut created);
                builder.build_flow(entry)
            };

            let flow_root_id = format!("{graph_root_id}:flow:{entry_id}");
            let mut flow_root = TaskNode {
                id: flow_root_id.clone(),
                title: format!("搭建事件流：{}", entry.title),
                description: format!("从入口“{}”开始按顺序复刻本事件流", entry.title),
                level: context.level + 1,
                parent_id: graph_root_id.clone(),
                children: Vec::new(),
                task_type: task_type.clone(),
                target_id: entry_id.clone(),
                detail: TaskDetail::EventFlowRoot {
                    graph_id: model.graph_id.clone(),
                    entry_node_id: entry_id.clone(),
                    graph_root_task_id: graph_root_id.clone(),
                },
                state: StepState::default(),
            };

            // 主序列之后冲刷延迟的分支端口步骤
            for step in plan.steps.into_iter().chain(plan.deferred.into_iter()) {
                let step_id = format!("{}:{}", flow_root_id, step.slug);
                flow_root.children.push(step_id.clone());
                self.push_node(
                    tree,
                    output,
                    TaskNode {
                        id: step_id,
                        title: step.title,
                        description: step.description,
                        level: context.level + 2,
                        parent_id: flow_root_id.clone(),
                        children: Vec::new(),
                        task_type: task_type.clone(),
                        target_id: step.target_id,
                        detail: step.detail,
                        state: StepState::default(),
                    },
                );
            }

            graph_root.children.push(flow_root_id.clone());
            self.push_node(tree, output, flow_root);
        }

        debug!(graph_root = %graph_root_id, children = graph_root.children.len(), "graph root assembled");
        self.push_node(tree, output, graph_root);
        if self.cache.is_some() {
            output.payloads.push((graph_root_id.clone(), model.clone()));
        }
        output.root_ids.push(graph_root_id.clone());
        output.graph_root_id = graph_root_id;
        Ok(())
    }

    fn compile_composite(
        &self,
        tree: &mut TaskTree,
        output: &mut CompileOutput,
        context: &CompileContext,
        composite_id: &str,
        composite_name: &str,
        composite_stack: &mut Vec<String>,
    ) -> Result<String, ConfigurationError> {
        // 复合引用自身（直接或传递）是致命配置错误，绝不静默丢弃
        if composite_stack.iter().any(|id| id == composite_id) {
            return Err(ConfigurationError::CompositeCycle {
                composite_id: composite_id.to_string(),
            });
        }
        let sub_model = self
            .store
            .get(composite_id)
            .ok_or_else(|| ConfigurationError::UnresolvedComposite {
                composite_id: composite_id.to_string(),
            })?;

        let composite_task_id = format!("{}:composite:{}", context.parent_id, composite_id);
        let sub_context = CompileContext {
            parent_id: composite_task_id.clone(),
            template_id: context.template_id.clone(),
            instance_id: context.instance_id.clone(),
            level: context.level + 1,
        };

        composite_stack.push(composite_id.to_string());
        let mut sub_output = CompileOutput::default();
        self.compile_into(tree, &mut sub_output, &sub_model, &sub_context, composite_stack)?;
        composite_stack.pop();

        output.created_ids.extend(sub_output.created_ids);
        output.payloads.extend(sub_output.payloads);
        self.push_node(
            tree,
            output,
            TaskNode {
                id: composite_task_id.clone(),
                title: format!("搭建复合子图：{composite_name}"),
                description: format!("先完成复合“{composite_name}”的子图，再回到当前图"),
                level: context.level,
                parent_id: context.parent_id.clone(),
                children: sub_output.root_ids,
                task_type: context.task_type().to_string(),
                target_id: composite_id.to_string(),
                detail: TaskDetail::CompositeStep {
                    composite_id: composite_id.to_string(),
                    composite_name: composite_name.to_string(),
                },
                state: StepState::default(),
            },
        );
        Ok(composite_task_id)
    }

    fn push_node(&self, tree: &mut TaskTree, output: &mut CompileOutput, node: TaskNode) {
        output.created_ids.push(node.id.clone());
        tree.upsert(node);
    }
}

/// 按节点声明顺序聚合本图的信号使用情况。
fn collect_signal_usage(model: &GraphModel) -> Vec<SignalUsage> {
    let mut usages: Vec<SignalUsage> = Vec::new();
    for node in &model.nodes {
        let Some(binding) = model.signal_bindings.get(&node.id) else {
            continue;
        };
        if let Some(existing) = usages.iter_mut().find(|u| u.signal_id == binding.signal_id) {
            existing.usage_count += 1;
        } else {
            usages.push(SignalUsage {
                signal_id: binding.signal_id.clone(),
                signal_name: binding.signal_name.clone(),
                usage_count: 1,
                local: binding.local,
            });
        }
    }
    usages
}
