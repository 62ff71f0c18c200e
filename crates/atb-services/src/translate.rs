//! Translation to English. DeepL when an API key is configured, otherwise
//! the public Google `translate_a/single` endpoint.

use std::time::Duration;

use serde::Deserialize;

use atb_core::{errors::Error, Result};

const GOOGLE_URL: &str = "https://translate.googleapis.com/translate_a/single";
const DEEPL_FREE_URL: &str = "https://api-free.deepl.com/v2/translate";
const DEEPL_PRO_URL: &str = "https://api.deepl.com/v2/translate";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Translation {
    /// Detected source language code, lower-case (`es`, `de`), or `unknown`.
    pub source_lang: String,
    pub text: String,
}

impl Translation {
    pub fn source_name(&self) -> String {
        language_name(&self.source_lang)
    }
}

#[derive(Clone, Debug)]
enum Backend {
    Google,
    DeepL { api_key: String },
}

#[derive(Clone, Debug)]
pub struct Translator {
    backend: Backend,
    http: reqwest::Client,
}

impl Translator {
    pub fn new(deepl_api_key: Option<String>) -> Result<Self> {
        let backend = match deepl_api_key {
            Some(api_key) if !api_key.trim().is_empty() => Backend::DeepL { api_key },
            _ => Backend::Google,
        };
        Ok(Self {
            backend,
            http: crate::http_client(Duration::from_secs(15))?,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Google => "Google",
            Backend::DeepL { .. } => "DeepL",
        }
    }

    pub async fn to_english(&self, text: &str) -> Result<Translation> {
        match &self.backend {
            Backend::Google => self.google(text).await,
            Backend::DeepL { api_key } => self.deepl(api_key, text).await,
        }
    }

    async fn google(&self, text: &str) -> Result<Translation> {
        let resp = self
            .http
            .get(GOOGLE_URL)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", "en"),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| Error::External(format!("translate request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("translate read error: {e}")))?;
        if !status.is_success() {
            return Err(Error::External(format!(
                "translate failed: {status} {}",
                crate::snippet(&body, 200)
            )));
        }
        parse_google(&body)
    }

    async fn deepl(&self, api_key: &str, text: &str) -> Result<Translation> {
        let url = if api_key.ends_with(":fx") {
            DEEPL_FREE_URL
        } else {
            DEEPL_PRO_URL
        };
        let resp = self
            .http
            .post(url)
            .header("Authorization", format!("DeepL-Auth-Key {api_key}"))
            .form(&[("text", text), ("target_lang", "EN-US")])
            .send()
            .await
            .map_err(|e| Error::External(format!("deepl request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("deepl read error: {e}")))?;
        if !status.is_success() {
            return Err(Error::External(format!(
                "deepl failed: {status} {}",
                crate::snippet(&body, 200)
            )));
        }
        parse_deepl(&body)
    }
}

/// `[[["Hello","Hola",...],...], null, "es", ...]`
pub fn parse_google(body: &str) -> Result<Translation> {
    let v: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::External(format!("translate json error: {e}")))?;

    let segments = v
        .get(0)
        .and_then(|s| s.as_array())
        .ok_or_else(|| Error::External("translate: unexpected response shape".to_string()))?;

    let text: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(Error::External("translate returned empty text".to_string()));
    }

    let source_lang = v
        .get(2)
        .and_then(|s| s.as_str())
        .unwrap_or("unknown")
        .to_lowercase();

    Ok(Translation { source_lang, text })
}

#[derive(Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Deserialize)]
struct DeepLTranslation {
    detected_source_language: Option<String>,
    text: String,
}

pub fn parse_deepl(body: &str) -> Result<Translation> {
    let r: DeepLResponse = serde_json::from_str(body)
        .map_err(|e| Error::External(format!("deepl json error: {e}")))?;
    let first = r
        .translations
        .into_iter()
        .next()
        .ok_or_else(|| Error::External("deepl returned no translations".to_string()))?;
    Ok(Translation {
        source_lang: first
            .detected_source_language
            .unwrap_or_else(|| "unknown".to_string())
            .to_lowercase(),
        text: first.text,
    })
}

/// English name for common language codes; the upper-cased code otherwise.
pub fn language_name(code: &str) -> String {
    let base = code.split(['-', '_']).next().unwrap_or(code).to_lowercase();
    let name = match base.as_str() {
        "ar" => "Arabic",
        "bn" => "Bengali",
        "de" => "German",
        "en" => "English",
        "es" => "Spanish",
        "fa" => "Persian",
        "fr" => "French",
        "hi" => "Hindi",
        "id" => "Indonesian",
        "it" => "Italian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "nl" => "Dutch",
        "pl" => "Polish",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "tr" => "Turkish",
        "uk" => "Ukrainian",
        "ur" => "Urdu",
        "vi" => "Vietnamese",
        "zh" => "Chinese",
        "unknown" | "" => "Unknown",
        _ => return code.to_uppercase(),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_google_segments() {
        let body = r#"[[["Hello, ","Hola, ",null,null,10],["how are you?","¿cómo estás?",null,null,10]],null,"es",null,null,null,1.0]"#;
        let t = parse_google(body).unwrap();
        assert_eq!(t.text, "Hello, how are you?");
        assert_eq!(t.source_lang, "es");
        assert_eq!(t.source_name(), "Spanish");
    }

    #[test]
    fn google_without_segments_is_an_error() {
        assert!(parse_google("[null]").is_err());
        assert!(parse_google("not json").is_err());
    }

    #[test]
    fn parses_deepl_response() {
        let body = r#"{"translations":[{"detected_source_language":"DE","text":"Good morning"}]}"#;
        let t = parse_deepl(body).unwrap();
        assert_eq!(t.text, "Good morning");
        assert_eq!(t.source_lang, "de");
        assert!(parse_deepl(r#"{"translations":[]}"#).is_err());
    }

    #[test]
    fn language_names() {
        assert_eq!(language_name("zh-CN"), "Chinese");
        assert_eq!(language_name("xx"), "XX");
        assert_eq!(language_name("unknown"), "Unknown");
    }

    #[test]
    fn backend_selection() {
        assert_eq!(Translator::new(None).unwrap().backend_name(), "Google");
        assert_eq!(Translator::new(Some(" ".into())).unwrap().backend_name(), "Google");
        assert_eq!(
            Translator::new(Some("k:fx".into())).unwrap().backend_name(),
            "DeepL"
        );
    }
}
