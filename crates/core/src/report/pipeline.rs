use crate::llm::{CompletionRequest, LlmClient};
use anyhow::Context;

/// Persona an LLM call is made under.
#[derive(Debug, Clone)]
pub struct Agent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl Agent {
    pub fn system_prompt(&self) -> String {
        format!(
            "Voce e {}.\n{}\n\nSeu objetivo: {}",
            self.role, self.backstory, self.goal
        )
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub name: &'static str,
    pub description: String,
    pub expected_output: String,
    pub agent: Agent,
    /// Indices of earlier tasks whose output is handed to this one.
    pub context: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub task: &'static str,
    pub role: String,
    pub text: String,
}

/// Fixed, strictly sequential chain of tasks.
#[derive(Debug, Clone)]
pub struct Pipeline {
    tasks: Vec<Task>,
}

impl Pipeline {
    pub fn new(tasks: Vec<Task>) -> anyhow::Result<Self> {
        anyhow::ensure!(!tasks.is_empty(), "pipeline needs at least one task");
        for (idx, task) in tasks.iter().enumerate() {
            for &dep in &task.context {
                anyhow::ensure!(
                    dep < idx,
                    "task '{}' references task #{dep}, which does not run before it",
                    task.name
                );
            }
        }
        Ok(Self { tasks })
    }

    /// Run every task in order; the first failure aborts the run.
    pub async fn run(&self, llm: &dyn LlmClient) -> anyhow::Result<Vec<TaskOutput>> {
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for (idx, task) in self.tasks.iter().enumerate() {
            let t0 = std::time::Instant::now();
            tracing::info!(idx, task = task.name, role = %task.agent.role, "running task");

            let req = CompletionRequest {
                system: task.agent.system_prompt(),
                prompt: task_prompt(task, &outputs),
            };
            let completion = llm
                .complete(req)
                .await
                .with_context(|| format!("task '{}' failed", task.name))?;

            tracing::info!(
                idx,
                task = task.name,
                chars = completion.text.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "task finished"
            );

            outputs.push(TaskOutput {
                task: task.name,
                role: task.agent.role.clone(),
                text: completion.text,
            });
        }

        Ok(outputs)
    }
}

fn task_prompt(task: &Task, prior: &[TaskOutput]) -> String {
    let mut out = format!(
        "{}\n\nResultado esperado:\n{}",
        task.description.trim(),
        task.expected_output.trim()
    );

    if !task.context.is_empty() {
        out.push_str("\n\nContexto produzido pelas etapas anteriores:");
        for &dep in &task.context {
            if let Some(p) = prior.get(dep) {
                out.push_str(&format!("\n\n--- {} ({}) ---\n{}", p.task, p.role, p.text.trim()));
            }
        }
    }

    out
}
