// 🔍 Receipt Analysis - one outbound vision/LLM call per receipt
//
// The analyzer is a trait so the HTTP layer and tests can swap the hosted
// model for a stub. `GeminiAnalyzer` is the production implementation.

use crate::config::AnalyzerConfig;
use crate::error::LedgerError;
use crate::normalizer::clean_json_text;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed instruction sent with every receipt image
pub const RECEIPT_PROMPT: &str = r#"Analyze this receipt image and identify Health Spending Account (HSA)-eligible items. HSA-eligible items are generally those used for medical care, to alleviate or treat a specific medical condition, or for preventive care.

Key classification rules:

Primary purpose test:
- Evaluate the item's primary marketed purpose.
- If the item is primarily for treating, alleviating, or preventing a medical condition, it is eligible.
- If the item has therapeutic active ingredients, it is eligible.
- Items marketed as medicines or treatments are eligible.

Product category recognition:
- Check whether the item falls under one of the qualified medical categories listed below.
- Generic and branded versions of medical items are both eligible.
- Items that treat symptoms (pain, cough, cold, etc.) are eligible.
- Consider product names as indicators of their medical category.

Medical vs. general use, for items with both uses:
- Marketed or sold as a medical treatment: eligible.
- Contains active medical ingredients: eligible.
- Primarily for symptom relief: eligible.
- Marketed for general comfort or convenience: not eligible.
- General hygiene, grooming, or daily-use items, even with health benefits: not eligible.

Return a JSON response with the following structure:
{
"date": "YYYY-MM-DD",
"merchant": "Store Name",
"taxRate": "look for %",
"items": [
{
"name": "Item Name",
"price": 0.00,
"HealthSpendingAccountEligible": true/false,
"eligibilityReason": "Brief explanation based on above rules",
"priceAnalysis": "Explanation of how the price was determined from the image"
}
]
}

Qualified medical and over-the-counter items include:
Abdominal/back supports; acid controllers; acne medications; allergy and sinus medications; analgesics; antacids; anti-diarrheal medications; anti-gas products; anti-itch and insect bite creams; antihistamines; antibiotic ointments; aspirin; baby rash ointments and creams; birth control and contraceptives; blood pressure monitors; blood sugar test kits and supplies; breast pumps and lactation supplies; cough drops; cold, cough and flu medications; cold sore remedies; compression hose/stockings; contact lens supplies; cold/hot packs for injuries; condoms; CPAP devices; crutches; decongestants; denture adhesives; diabetic supplies; digestive aids; ear wax removal treatments; eczema treatments; elastic bandages; expectorants; feminine anti-fungal treatments; feminine hygiene products; fever reducing medications; first aid creams; first aid kits; glucosamine and chondroitin; glucose monitoring equipment; headache medications; heart rate monitors; hearing aids and batteries; heating pads; hemorrhoidal preparations; incontinence supplies; insulin; laxatives; medicated lip products; medic alert bracelets; menstrual pain relievers; menstrual products; motion sickness medications; neti pots; nasal strips or sprays; nicotine gum, lozenges or patches for smoking cessation; ovulation monitors; pain relievers; Pedialyte and rehydration solutions; pregnancy test kits; prescription drugs; respiratory treatments; sleep aids and sedatives; splints and casts; stomach remedies; sunscreen (SPF 30 or higher); support braces; syringes; thermometers; throat lozenges; toothache relievers; eye drops; walkers; wart removal; wheelchairs; yeast infection medication.
"#;

// ============================================================================
// RECEIPT IMAGE
// ============================================================================

/// Image payload ready for the analysis call
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptImage {
    pub mime_type: String,
    /// Base64 payload (no data-URI prefix)
    pub data: String,
    /// SHA-256 of the decoded bytes
    pub fingerprint: String,
}

impl ReceiptImage {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
            fingerprint: fingerprint(bytes),
        }
    }

    /// Parse `data:<mime>;base64,<payload>`
    pub fn from_data_uri(uri: &str) -> Result<Self, LedgerError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| LedgerError::InvalidRequest("Unsupported image format".to_string()))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| LedgerError::InvalidRequest("Malformed data URI".to_string()))?;

        let mut header_parts = header.split(';');
        let mime_type = header_parts.next().unwrap_or_default().trim();
        let is_base64 = header_parts.any(|p| p.trim().eq_ignore_ascii_case("base64"));

        if !is_base64 {
            return Err(LedgerError::InvalidRequest(
                "Image data must be base64 encoded".to_string(),
            ));
        }
        if !mime_type.starts_with("image/") {
            return Err(LedgerError::InvalidRequest(format!(
                "Unsupported image type '{}'",
                mime_type
            )));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| LedgerError::InvalidRequest(format!("Invalid base64 image data: {}", e)))?;
        if bytes.is_empty() {
            return Err(LedgerError::InvalidRequest("Image data is empty".to_string()));
        }

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: payload.trim().to_string(),
            fingerprint: fingerprint(&bytes),
        })
    }

    /// Read an image file, MIME type inferred from the extension
    pub fn from_file(path: &Path) -> Result<Self, LedgerError> {
        let mime_type = mime_for_path(path).ok_or_else(|| {
            LedgerError::InvalidRequest(format!("Unsupported image file: {:?}", path))
        })?;
        let bytes = std::fs::read(path).map_err(|e| {
            LedgerError::InvalidRequest(format!("Cannot read image {:?}: {}", path, e))
        })?;
        Ok(Self::from_bytes(&bytes, mime_type))
    }

    /// Provenance tag stored on every record created from this image
    pub fn source_tag(&self) -> String {
        format!("receipt:{}", &self.fingerprint[..16])
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Server-side tidy-up of the reply before it goes back to the client
///
/// Cleaned text when cleanup yields valid JSON; otherwise the reply is
/// passed through untouched so the client-side parse reports the failure.
pub fn prepare_analysis_text(raw: &str) -> String {
    let cleaned = clean_json_text(raw);
    if serde_json::from_str::<serde_json::Value>(&cleaned).is_ok() {
        cleaned
    } else {
        warn!("Analysis reply is not valid JSON, passing it through");
        raw.to_string()
    }
}

// ============================================================================
// ANALYZER TRAIT
// ============================================================================

#[async_trait]
pub trait ReceiptAnalyzer: Send + Sync {
    /// Send the image with the fixed prompt; returns the model's raw text
    async fn analyze(&self, image: &ReceiptImage) -> Result<String, LedgerError>;

    /// False when the analyzer cannot make calls (e.g. no API key)
    fn is_configured(&self) -> bool {
        true
    }
}

// ============================================================================
// GEMINI
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

pub struct GeminiAnalyzer {
    client: reqwest::Client,
    config: AnalyzerConfig,
}

impl GeminiAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, LedgerError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| LedgerError::Service(format!("failed to build HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            warn!("Gemini API key not configured; receipt analysis is disabled");
        }

        Ok(Self { client, config })
    }

    fn url(&self, api_key: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model,
            api_key
        )
    }
}

#[async_trait]
impl ReceiptAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, image: &ReceiptImage) -> Result<String, LedgerError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LedgerError::Service("Gemini API key not configured".to_string()))?;

        info!(
            "Analyzing receipt {} ({}, {} base64 bytes) with {}",
            &image.fingerprint[..12],
            image.mime_type,
            image.data.len(),
            self.config.model
        );

        // Image first, then the instruction
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: &image.mime_type,
                            data: &image.data,
                        },
                    },
                    Part::Text {
                        text: RECEIPT_PROMPT,
                    },
                ],
            }],
        };

        let resp = self
            .client
            .post(self.url(api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Service(format!("request failed: {}", e.without_url())))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Service(format!(
                "Gemini returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Service(format!("unreadable response: {}", e.without_url())))?;

        match parsed.text() {
            Some(text) => {
                debug!("Gemini reply: {}", text.chars().take(100).collect::<String>());
                Ok(text)
            }
            None => {
                let reason = parsed
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .unwrap_or_else(|| "empty response".to_string());
                Err(LedgerError::Service(format!("no text in reply: {}", reason)))
            }
        }
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }
}
