use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{is_affirmative, ClassificationGate, QueryClassifier};
use crate::models::{ClassificationResult, ClassificationSource, HistoryEntry};
use crate::services::providers::LlmProvider;
use crate::utils::RagError;

const TOOL_NAME: &str = "classify_query";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Action\s*:\s*(.+?)\s*$").expect("valid regex")
});

static ACTION_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Action\s*Input\s*:\s*(.+?)\s*$").expect("valid regex")
});

static FINAL_ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Final\s*Answer\s*:\s*(.*)").expect("valid regex"));

/// One parsed agent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AgentStep {
    Action { tool: String, input: String },
    Final(String),
    Invalid,
}

fn parse_step(output: &str) -> AgentStep {
    if let Some(caps) = FINAL_ANSWER_RE.captures(output) {
        return AgentStep::Final(caps[1].trim().to_string());
    }

    let tool = ACTION_RE.captures(output).map(|c| c[1].to_string());
    let input = ACTION_INPUT_RE.captures(output).map(|c| c[1].to_string());

    match (tool, input) {
        (Some(tool), Some(input)) => AgentStep::Action {
            tool: tool.trim_matches(['`', '[', ']']).trim().to_string(),
            input: input.trim_matches(['"', '\'', '`']).trim().to_string(),
        },
        _ => AgentStep::Invalid,
    }
}

/// Drop anything the model wrote after its own "Observation:" line; the tool's
/// observation replaces it.
fn strip_hallucinated_observation(output: &str) -> &str {
    output
        .find("\nObservation:")
        .map(|idx| &output[..idx])
        .unwrap_or(output)
        .trim_end()
}

/// ReAct agent with a single tool, `classify_query`, wrapping the keyword rules.
///
/// Same pre-filter and cache as [`super::PatternLlmClassifier`]; only the LLM tier
/// differs. When the agent runs out of iterations without a final answer the tool
/// verdict for the raw question decides.
pub struct ToolCallingClassifier {
    gate: ClassificationGate,
    llm: Arc<dyn LlmProvider>,
    domain: String,
    max_iterations: usize,
}

impl ToolCallingClassifier {
    pub(crate) fn new(
        gate: ClassificationGate,
        llm: Arc<dyn LlmProvider>,
        domain: &str,
        max_iterations: usize,
    ) -> Self {
        Self {
            gate,
            llm,
            domain: domain.to_string(),
            max_iterations: max_iterations.max(1),
        }
    }

    fn tool(&self, input: &str) -> String {
        self.gate.patterns().tool_verdict(input, &self.domain)
    }

    fn build_prompt(&self, question: &str, scratchpad: &str) -> String {
        let domain = &self.domain;
        format!(
            r#"Answer the following questions as best you can. You have access to the following tools:

{TOOL_NAME}: Classify if a question needs {domain} documentation retrieval. Returns YES/NO with reasoning.

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{TOOL_NAME}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: YES or NO

Begin!

Question: Does this question need {domain} documentation? {question}
Thought:{scratchpad}"#
        )
    }

    async fn run_agent(&self, question: &str) -> anyhow::Result<bool> {
        let mut scratchpad = String::new();

        for iteration in 1..=self.max_iterations {
            let prompt = self.build_prompt(question, &scratchpad);
            let output = self.llm.invoke(&prompt).await?;

            let observation = match parse_step(&output) {
                AgentStep::Final(answer) => {
                    debug!("Agent final answer after {} step(s): {:?}", iteration, answer);
                    return Ok(is_affirmative(&answer));
                }
                AgentStep::Action { tool, input } if tool == TOOL_NAME => {
                    let verdict = self.tool(&input);
                    debug!("Agent called {}({:?}) -> {}", TOOL_NAME, input, verdict);
                    verdict
                }
                AgentStep::Action { tool, .. } => {
                    debug!("Agent asked for unknown tool {:?}", tool);
                    format!("{} is not a valid tool, try {}.", tool, TOOL_NAME)
                }
                AgentStep::Invalid => {
                    debug!("Agent output could not be parsed");
                    "Invalid format: use Action/Action Input or Final Answer.".to_string()
                }
            };

            scratchpad.push_str(&format!(
                " {}\nObservation: {}\nThought:",
                strip_hallucinated_observation(output.trim()),
                observation
            ));
        }

        let verdict = self.tool(question);
        warn!(
            "Agent stopped after {} iteration(s) without a final answer, using tool verdict: {}",
            self.max_iterations, verdict
        );
        Ok(is_affirmative(&verdict))
    }
}

#[async_trait]
impl QueryClassifier for ToolCallingClassifier {
    async fn classify(
        &self,
        question: &str,
        _history: &[HistoryEntry],
    ) -> Result<ClassificationResult, RagError> {
        let start = Instant::now();

        if let Some(result) = self.gate.pre_classify(question) {
            return Ok(result);
        }

        let verdict = self.run_agent(question).await;
        let result = self
            .gate
            .settle(question, verdict, ClassificationSource::Agent)?;

        info!(
            "Agent classification: needs_retrieval={} ({}ms)",
            result.needs_retrieval,
            start.elapsed().as_millis()
        );

        Ok(result)
    }
}
