//! Prompt rendering for the executor and the decision oracle.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::summary::OracleSummary;
use crate::core::types::Action;

const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const IMPLEMENT_TEMPLATE: &str = include_str!("prompts/implement.md");
const DECOMPOSE_TEMPLATE: &str = include_str!("prompts/decompose.md");
const MONITOR_TEMPLATE: &str = include_str!("prompts/monitor.md");
const ORACLE_TEMPLATE: &str = include_str!("prompts/oracle.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("review", REVIEW_TEMPLATE),
            ("implement", IMPLEMENT_TEMPLATE),
            ("decompose", DECOMPOSE_TEMPLATE),
            ("monitor", MONITOR_TEMPLATE),
            ("oracle", ORACLE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} template"))?;
        }
        Ok(Self { env })
    }

    /// Render the executor prompt for one action.
    pub fn render_action(&self, action: &Action, org: &str) -> Result<String> {
        let name = match action {
            Action::Review { .. } => "review",
            Action::Implement { .. } => "implement",
            Action::Decompose { .. } => "decompose",
            Action::Monitor { .. } => "monitor",
        };
        let template = self.env.get_template(name)?;
        let rendered = template.render(context! {
            org => org,
            repo => action.repo(),
            number => action.number(),
            title => action.title(),
            body => action.body().map(str::trim).unwrap_or_default(),
        })?;
        Ok(rendered)
    }

    /// Render the fixed oracle instruction around a snapshot summary.
    pub fn render_oracle(&self, summary: &OracleSummary, max_actions: usize) -> Result<String> {
        let state = serde_json::to_string_pretty(summary).context("serialize oracle summary")?;
        let template = self.env.get_template("oracle")?;
        let rendered = template.render(context! {
            state => state,
            max_actions => max_actions,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::summary::SummaryRef;

    #[test]
    fn implement_prompt_carries_body_and_repo() {
        let engine = PromptEngine::new().expect("engine");
        let action = Action::Implement {
            repo: "webapp".to_string(),
            number: 55,
            title: "Add search".to_string(),
            body: "  Search across mentors.\n".to_string(),
        };

        let prompt = engine.render_action(&action, "mentorize-app").expect("render");

        assert!(prompt.contains("mentorize-app/webapp"));
        assert!(prompt.contains("Task #55: Add search"));
        assert!(prompt.contains("Search across mentors."));
    }

    #[test]
    fn review_prompt_names_the_pr() {
        let engine = PromptEngine::new().expect("engine");
        let action = Action::Review {
            repo: "infra".to_string(),
            number: 12,
            title: "Bump".to_string(),
        };

        let prompt = engine.render_action(&action, "acme").expect("render");

        assert!(prompt.contains("gh pr view 12 --repo acme/infra"));
    }

    #[test]
    fn oracle_prompt_embeds_summary_json_unescaped() {
        let engine = PromptEngine::new().expect("engine");
        let summary = OracleSummary {
            prs: Vec::new(),
            open_tasks: Vec::new(),
            processing_tasks: vec![SummaryRef {
                repo: "webapp".to_string(),
                number: 61,
            }],
            epics_without_tasks: Vec::new(),
        };

        let prompt = engine.render_oracle(&summary, 3).expect("render");

        assert!(prompt.contains("\"processing_tasks\""));
        assert!(prompt.contains("At most 3 actions"));
        assert!(prompt.contains("\"reasoning\""));
    }
}
