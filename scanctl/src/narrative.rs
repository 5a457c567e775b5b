//! Natural-language analysis of a compliance report.
//!
//! [`NarrativeAnalyzer`] renders the structured [`Analysis`] of a report into a system
//! prompt and forwards it, together with the caller's question, to a text-generation
//! service. The service is reached through the [`TextGenerator`] trait; the production
//! implementation, [`OpenAiCompatibleClient`], speaks the OpenAI chat completions wire
//! format, which Groq and most hosted providers accept.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use minijinja::{Environment, context};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::NarrativeConfig;
use crate::errors::{Error, Result};
use crate::inspectors::http::{build_client, failure_of, join};
use crate::report::{Analysis, ComplianceReport};

const SYSTEM_PROMPT_TEMPLATE: &str = "system_prompt";

const SYSTEM_PROMPT: &str = r#"You're a Supabase compliance expert. Analyze this report:

Current Compliance Status:
- MFA: {{ analysis.details.mfa.compliantCount }}/{{ analysis.details.mfa.totalCount }} users compliant ({{ analysis.scores.mfa }}%)
- RLS: {{ analysis.details.rls.compliantCount }}/{{ analysis.details.rls.totalCount }} tables compliant ({{ analysis.scores.rls }}%)
- PITR: {{ analysis.details.pitr.compliantCount }}/{{ analysis.details.pitr.totalCount }} projects compliant ({{ analysis.scores.pitr }}%)

Overall Score: {{ analysis.scores.overall }}%

High Risks: {{ analysis.risks.high | join(", ") or "None" }}
Medium Risks: {{ analysis.risks.medium | join(", ") or "None" }}
Low Risks: {{ analysis.risks.low | join(", ") or "None" }}

Recommendations:
{% for recommendation in analysis.recommendations %}- {{ recommendation }}
{% else %}- None
{% endfor %}
Please provide a detailed analysis based on this data and the user's question."#;

const NO_RESPONSE: &str = "No response from AI service";

/// A service that completes a two-message (system, user) conversation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if it has any text.
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
    }
}

/// [`TextGenerator`] backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &NarrativeConfig) -> anyhow::Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!("No text-generation API key configured; chat requests will fail");
        }

        Ok(Self {
            client: build_client(config.request_timeout)?,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| Error::NarrativeService {
            message: "Text-generation service is not configured".to_string(),
        })?;

        let url = join(&self.base_url, "chat/completions").map_err(|e| Error::NarrativeService {
            message: format!("could not build completions URL: {e}"),
        })?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage { role: "user", content: user },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("Requesting chat completion from {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::NarrativeService { message: e.to_string() })?;

        if !response.status().is_success() {
            let (_, message) = failure_of(response, "Error processing chat request").await;
            return Err(Error::NarrativeService { message });
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| Error::NarrativeService {
            message: format!("error decoding response body: {e}"),
        })?;

        completion.into_content().ok_or_else(|| Error::NarrativeService {
            message: NO_RESPONSE.to_string(),
        })
    }
}

/// A generated answer and the analysis it was grounded on.
#[derive(Debug, Clone)]
pub struct Narrative {
    pub response: String,
    pub analysis: Analysis,
}

/// Builds prompts from reports and asks a [`TextGenerator`] about them.
///
/// Constructed once at startup and shared through the application state.
pub struct NarrativeAnalyzer {
    generator: Arc<dyn TextGenerator>,
    templates: Environment<'static>,
}

impl NarrativeAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> anyhow::Result<Self> {
        let mut templates = Environment::new();
        templates.add_template(SYSTEM_PROMPT_TEMPLATE, SYSTEM_PROMPT)?;
        Ok(Self { generator, templates })
    }

    pub fn system_prompt(&self, analysis: &Analysis) -> Result<String> {
        self.templates
            .get_template(SYSTEM_PROMPT_TEMPLATE)
            .and_then(|template| template.render(context! { analysis => analysis }))
            .map_err(|e| Error::Internal {
                operation: format!("render narrative prompt: {e}"),
            })
    }

    /// Analyze `report` and answer `question` about it.
    #[instrument(skip_all)]
    pub async fn narrate(&self, question: &str, report: &ComplianceReport, now: DateTime<Utc>) -> Result<Narrative> {
        let analysis = Analysis::of(report, now)?;
        let prompt = self.system_prompt(&analysis)?;

        let response = self.generator.complete(&prompt, question).await?;
        info!(overall = analysis.scores.overall, "Narrative analysis generated");

        Ok(Narrative { response, analysis })
    }
}
