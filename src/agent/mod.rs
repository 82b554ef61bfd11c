//! Tool-using reasoning loop
//!
//! AWAITING DECISION → INVOKING TOOLS → AWAITING DECISION ... → FINISHED
//!
//! Each decision is one chat-completion call with the session's tools
//! advertised. Requested tool calls run in order and their rendered output
//! is appended to the scratchpad before the next decision.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::llm::{ChatModel, PromptMessage};
use crate::models::{ToolCall, ToolInvocation};
use crate::session::history::{ChatMessage, MessageRole};
use crate::tools::ToolRegistry;
use crate::Result;

pub const DEFAULT_MAX_ITERATIONS: usize = 15;
pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit.";

/// Outcome of one user turn.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub output: String,
    pub intermediate_steps: Vec<ToolInvocation>,
    /// Number of model decisions made
    pub iterations: usize,
    pub stopped_at_limit: bool,
}

enum LoopState {
    AwaitingDecision,
    InvokingTools(Vec<ToolCall>),
    Finished { output: String, stopped_at_limit: bool },
}

pub fn system_prompt(user_name: &str) -> String {
    format!(
        "You are a specialized Financial Advisor Bot assisting {}. You must only use the tools \
         provided to you. If you cannot answer using your tools, politely say you cannot help. \
         When you use the 'financial_knowledge_search' tool, you MUST cite the source and page \
         number for the information in your final answer. For example: 'According to [Source \
         File], page [Page Number], dollar-cost averaging is...'.",
        user_name
    )
}

pub struct ReasoningAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl ReasoningAgent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Answer `input` given the prior conversation (which must not already
    /// contain `input`).
    pub async fn run(
        &self,
        user_name: &str,
        history: &[ChatMessage],
        input: &str,
    ) -> Result<AgentTurn> {
        let specs = self.tools.specs();
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage::system(system_prompt(user_name)));
        messages.extend(history.iter().map(|m| match m.role {
            MessageRole::User => PromptMessage::user(m.content.clone()),
            MessageRole::Assistant => PromptMessage::assistant(m.content.clone()),
        }));
        messages.push(PromptMessage::user(input));

        let mut steps = Vec::new();
        let mut iterations = 0;
        let mut state = LoopState::AwaitingDecision;

        info!(
            history = history.len(),
            tools = specs.len(),
            "Reasoning loop: starting turn"
        );

        loop {
            state = match state {
                LoopState::AwaitingDecision => {
                    if iterations >= self.max_iterations {
                        warn!(iterations, "Reasoning loop hit its iteration limit");
                        LoopState::Finished {
                            output: ITERATION_LIMIT_MESSAGE.to_string(),
                            stopped_at_limit: true,
                        }
                    } else {
                        iterations += 1;
                        let reply = self.model.complete(&messages, &specs).await?;

                        if reply.tool_calls.is_empty() {
                            LoopState::Finished {
                                output: reply.content.unwrap_or_default(),
                                stopped_at_limit: false,
                            }
                        } else {
                            debug!(
                                iteration = iterations,
                                calls = reply.tool_calls.len(),
                                "Model requested tools"
                            );
                            messages.push(PromptMessage::assistant_tool_calls(
                                reply.content,
                                reply.tool_calls.clone(),
                            ));
                            LoopState::InvokingTools(reply.tool_calls)
                        }
                    }
                }
                LoopState::InvokingTools(calls) => {
                    for call in calls {
                        let step = self.invoke(&call).await;
                        messages.push(PromptMessage::tool_result(&call.id, step.output.clone()));
                        steps.push(step);
                    }
                    LoopState::AwaitingDecision
                }
                LoopState::Finished {
                    output,
                    stopped_at_limit,
                } => {
                    info!(
                        iterations,
                        tool_calls = steps.len(),
                        "Reasoning loop: turn complete"
                    );
                    return Ok(AgentTurn {
                        output,
                        intermediate_steps: steps,
                        iterations,
                        stopped_at_limit,
                    });
                }
            };
        }
    }

    /// Run one tool call. Never fails: errors become the observation text.
    async fn invoke(&self, call: &ToolCall) -> ToolInvocation {
        let started = Instant::now();

        let (output, succeeded) = if self.tools.get(&call.name).is_none() {
            let message = format!(
                "{} is not a valid tool, try one of [{}].",
                call.name,
                self.tools.list().join(", ")
            );
            (message, false)
        } else {
            match self.tools.execute(&call.name, &call.arguments).await {
                Ok(output) => (output.text, true),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                    (e.to_tool_message(), false)
                }
            }
        };

        ToolInvocation {
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            output,
            succeeded,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptRole;
    use crate::tools::{InvestmentProjectionTool, StockPriceTool};
    use crate::test_support::{MockMarketData, ScriptedChatModel};
    use serde_json::json;

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StockPriceTool::new(Arc::new(
            MockMarketData::default().with_price("AAPL", 189.5),
        ))));
        registry.register(Arc::new(InvestmentProjectionTool));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let model = Arc::new(ScriptedChatModel::new().with_text("Hello Ada."));
        let agent = ReasoningAgent::new(model.clone(), registry());

        let turn = agent.run("Ada", &[], "hi").await.unwrap();

        assert_eq!(turn.output, "Hello Ada.");
        assert_eq!(turn.iterations, 1);
        assert!(turn.intermediate_steps.is_empty());

        let prompt = model.last_prompt();
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, PromptRole::System);
        assert!(prompt[0].content.as_deref().unwrap().contains("assisting Ada"));
        assert_eq!(prompt[1].content.as_deref(), Some("hi"));
        assert_eq!(
            model.tool_specs.lock().unwrap()[0],
            vec!["get_current_stock_price", "calculate_investment_projection"]
        );
    }

    #[tokio::test]
    async fn test_tool_output_is_fed_back() {
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_tool_call("get_current_stock_price", json!({"ticker": "AAPL"}))
                .with_text("Apple trades at $189.50."),
        );
        let agent = ReasoningAgent::new(model.clone(), registry());

        let turn = agent.run("Ada", &[], "Price of Apple?").await.unwrap();

        assert_eq!(turn.output, "Apple trades at $189.50.");
        assert_eq!(turn.iterations, 2);
        assert_eq!(turn.intermediate_steps.len(), 1);
        assert!(turn.intermediate_steps[0].succeeded);

        let prompt = model.last_prompt();
        let observation = prompt.last().unwrap();
        assert_eq!(observation.role, PromptRole::Tool);
        assert_eq!(observation.tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(
            observation.content.as_deref(),
            Some("The current price of AAPL is $189.50.")
        );
    }

    #[tokio::test]
    async fn test_tool_errors_do_not_abort_the_turn() {
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_tool_call("get_current_stock_price", json!({"ticker": "apple"}))
                .with_text("Please give me a ticker like AAPL."),
        );
        let agent = ReasoningAgent::new(model.clone(), registry());

        let turn = agent.run("Ada", &[], "Price of apple?").await.unwrap();

        assert_eq!(turn.output, "Please give me a ticker like AAPL.");
        let step = &turn.intermediate_steps[0];
        assert!(!step.succeeded);
        assert_eq!(
            step.output,
            "Error: Invalid ticker symbol format. Please use 1-5 uppercase letters (e.g., 'AAPL')."
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_observation() {
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_tool_call("get_weather", json!({}))
                .with_text("I can only help with finance."),
        );
        let agent = ReasoningAgent::new(model, registry());

        let turn = agent.run("Ada", &[], "Weather?").await.unwrap();

        assert_eq!(
            turn.intermediate_steps[0].output,
            "get_weather is not a valid tool, try one of [get_current_stock_price, calculate_investment_projection]."
        );
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_tool_call("get_current_stock_price", json!({"ticker": "AAPL"}))
                .with_tool_call("get_current_stock_price", json!({"ticker": "AAPL"}))
                .with_tool_call("get_current_stock_price", json!({"ticker": "AAPL"})),
        );
        let agent = ReasoningAgent::new(model.clone(), registry()).with_max_iterations(2);

        let turn = agent.run("Ada", &[], "loop").await.unwrap();

        assert_eq!(turn.output, ITERATION_LIMIT_MESSAGE);
        assert!(turn.stopped_at_limit);
        assert_eq!(turn.intermediate_steps.len(), 2);
        assert_eq!(model.prompt_count(), 2);
    }

    #[tokio::test]
    async fn test_history_precedes_input() {
        let model = Arc::new(ScriptedChatModel::new().with_text("Yes."));
        let agent = ReasoningAgent::new(model.clone(), registry());
        let history = vec![
            ChatMessage::new(MessageRole::User, "What is an ETF?"),
            ChatMessage::new(MessageRole::Assistant, "A pooled fund."),
        ];

        agent.run("Ada", &history, "Are they cheap?").await.unwrap();

        let roles: Vec<PromptRole> = model.last_prompt().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                PromptRole::System,
                PromptRole::User,
                PromptRole::Assistant,
                PromptRole::User
            ]
        );
    }

    #[tokio::test]
    async fn test_model_errors_propagate() {
        let model = Arc::new(ScriptedChatModel::new().with_error("rate limited"));
        let agent = ReasoningAgent::new(model, registry());

        tokio_test::assert_err!(agent.run("Ada", &[], "hi").await);
    }
}
