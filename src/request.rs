use crate::error::GenerateError;
use serde::{Deserialize, Serialize};

/// Target platform for the generated post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Twitter,
    Linkedin,
    Facebook,
    Blog,
}

impl Platform {
    pub fn label(self) -> &'static str {
        match self {
            Self::Twitter => "Twitter",
            Self::Linkedin => "LinkedIn",
            Self::Facebook => "Facebook",
            Self::Blog => "Blog",
        }
    }
}

/// Source or style material: either a list of URLs or raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Material {
    Urls(Vec<String>),
    Text(String),
}

impl Material {
    /// URLs that are non-empty after trimming, in order.
    pub fn non_empty_urls(urls: &[String]) -> Vec<String> {
        urls.iter()
            .filter(|u| !u.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// Bearer key plus upstream endpoint, supplied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub endpoint: String,
}

impl Credentials {
    /// Both halves or neither; a lone key or lone endpoint is a configuration mistake.
    pub fn pair(api_key: Option<String>, endpoint: Option<String>) -> anyhow::Result<Option<Self>> {
        let api_key = api_key.filter(|v| !v.trim().is_empty());
        let endpoint = endpoint.filter(|v| !v.trim().is_empty());
        match (api_key, endpoint) {
            (Some(api_key), Some(endpoint)) => Ok(Some(Self { api_key, endpoint })),
            (None, None) => Ok(None),
            _ => anyhow::bail!(
                "If you provide an API key, you must also provide an endpoint, and vice versa."
            ),
        }
    }
}

/// Inclusive bounds on source text length, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLimits {
    pub min: usize,
    pub max: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self { min: 100, max: 5000 }
    }
}

/// One user submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub source: Material,
    pub style: Option<Material>,
    pub platform: Platform,
    pub streaming: bool,
    pub credentials: Option<Credentials>,
}

impl GenerationRequest {
    /// Check the request before anything is sent.
    pub fn validate(&self, limits: TextLimits) -> Result<(), GenerateError> {
        match &self.source {
            Material::Urls(urls) => {
                if Material::non_empty_urls(urls).is_empty() {
                    return Err(GenerateError::Validation(
                        "At least one content URL is required".to_string(),
                    ));
                }
            }
            Material::Text(text) => {
                if text.is_empty() {
                    return Err(GenerateError::Validation("content is required".to_string()));
                }
                let len = text.chars().count();
                if len < limits.min {
                    return Err(GenerateError::Validation(format!(
                        "content must be at least {} characters",
                        limits.min
                    )));
                }
                if len > limits.max {
                    return Err(GenerateError::Validation(format!(
                        "content must be at most {} characters",
                        limits.max
                    )));
                }
            }
        }
        Ok(())
    }

    /// Wire body sent to the relay server. Blank URLs are dropped.
    pub fn to_body(&self) -> GenerateBody {
        let (source_urls, source_text, is_source_urls) = split_material(Some(&self.source));
        let (behaviour_urls, behaviour_text, is_behavior_urls) = split_material(self.style.as_ref());
        GenerateBody {
            source_urls,
            source_text,
            is_source_urls,
            behaviour_urls,
            behaviour_text,
            is_behavior_urls,
            api_key: self.credentials.as_ref().map(|c| c.api_key.clone()),
            endpoint: self.credentials.as_ref().map(|c| c.endpoint.clone()),
            service: self.platform,
            stream: self.streaming,
        }
    }
}

fn split_material(m: Option<&Material>) -> (Vec<String>, String, bool) {
    match m {
        Some(Material::Urls(urls)) => (Material::non_empty_urls(urls), String::new(), true),
        Some(Material::Text(text)) => (Vec::new(), text.clone(), false),
        None => (Vec::new(), String::new(), false),
    }
}

/// JSON body accepted by `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub source_urls: Vec<String>,
    #[serde(default)]
    pub source_text: String,
    #[serde(rename = "isSourceURLs", default)]
    pub is_source_urls: bool,
    #[serde(default)]
    pub behaviour_urls: Vec<String>,
    #[serde(default)]
    pub behaviour_text: String,
    #[serde(rename = "isBehaviorURLs", default)]
    pub is_behavior_urls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub service: Platform,
    #[serde(default)]
    pub stream: bool,
}

impl GenerateBody {
    pub fn source(&self) -> Material {
        if self.is_source_urls {
            Material::Urls(self.source_urls.clone())
        } else {
            Material::Text(self.source_text.clone())
        }
    }

    /// Style material, or `None` when the selected mode carries nothing.
    pub fn style(&self) -> Option<Material> {
        if self.is_behavior_urls {
            let urls = Material::non_empty_urls(&self.behaviour_urls);
            (!urls.is_empty()).then_some(Material::Urls(urls))
        } else if !self.behaviour_text.trim().is_empty() {
            Some(Material::Text(self.behaviour_text.clone()))
        } else {
            None
        }
    }
}
