use super::placeholders::missing_placeholders;
use super::retry::{parse_retry_after, retry_with_policy, RetryPolicy, Sleeper, TokioSleeper};
use super::{is_acronym, language_name, ProviderError, TranslationProvider};
use crate::config::ProviderOptions;
use log::{debug, warn};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, SystemTime};

const PROVIDER_NAME: &str = "openai-compatible";

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslationPayload {
    translations: Vec<String>,
}

/// Provider backed by an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpProvider<S = TokioSleeper> {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    source_language: String,
    policy: RetryPolicy,
    skip_acronyms: bool,
    sleeper: S,
}

impl HttpProvider<TokioSleeper> {
    pub fn new(
        options: &ProviderOptions,
        api_key: &str,
        source_language: &str,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(options.request_timeout())
            .build()
            .map_err(|err| ProviderError::Network(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: options.endpoint.clone(),
            model: options.model.clone(),
            api_key: api_key.trim().to_string(),
            source_language: source_language.to_string(),
            policy: RetryPolicy::new(
                Duration::from_millis(options.base_delay_ms),
                Duration::from_millis(options.max_delay_ms),
                options.max_attempts,
            ),
            skip_acronyms: options.skip_acronyms,
            sleeper: TokioSleeper,
        })
    }
}

impl<S: Sleeper> HttpProvider<S> {
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> HttpProvider<T> {
        HttpProvider {
            client: self.client,
            endpoint: self.endpoint,
            model: self.model,
            api_key: self.api_key,
            source_language: self.source_language,
            policy: self.policy,
            skip_acronyms: self.skip_acronyms,
            sleeper,
        }
    }

    fn system_prompt(&self, target_language: &str, count: usize) -> String {
        format!(
            "You translate user interface strings of a marketing analytics dashboard from {} to {}. \
             Keep placeholders in curly braces, HTML tags, URLs and brand names exactly as they are. \
             Respond with a JSON object of the form {{\"translations\": [...]}} holding exactly {} \
             strings in the same order as the input.",
            language_name(&self.source_language),
            language_name(target_language),
            count
        )
    }

    async fn request(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": self.system_prompt(target_language, texts.len()) },
                { "role": "user", "content": json!({ "texts": texts }).to_string() }
            ]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_retry_after(value, SystemTime::now()));
            let message = response.text().await.unwrap_or_default();
            return Err(map_failure(status, message, retry_after));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::MalformedResponse(err.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("response has no content".into()))?;
        let payload: TranslationPayload = serde_json::from_str(strip_code_fence(&content))
            .map_err(|err| ProviderError::MalformedResponse(err.to_string()))?;

        if payload.translations.len() != texts.len() {
            return Err(ProviderError::LengthMismatch {
                expected: texts.len(),
                actual: payload.translations.len(),
            });
        }
        Ok(payload.translations)
    }
}

impl<S: Sleeper> TranslationProvider for HttpProvider<S> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn translate_batch(&self, texts: &[String], target_language: &str) -> Vec<String> {
        let mut outputs = texts.to_vec();

        let pending: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .filter(|(_, text)| !(self.skip_acronyms && is_acronym(text)))
            .map(|(index, _)| index)
            .collect();
        if pending.is_empty() {
            return outputs;
        }

        let request_texts: Vec<String> = pending.iter().map(|&index| texts[index].clone()).collect();
        let result = retry_with_policy(self.policy, &self.sleeper, |attempt| {
            debug!(
                "requesting {} translations into {} (attempt {})",
                request_texts.len(),
                target_language,
                attempt
            );
            self.request(&request_texts, target_language)
        })
        .await;

        let translations = match result {
            Ok(translations) => translations,
            Err(err) => {
                warn!(
                    "translation into {} failed, keeping {} source strings: {}",
                    target_language,
                    request_texts.len(),
                    err
                );
                return outputs;
            }
        };

        for (index, translated) in pending.into_iter().zip(translations) {
            let missing = missing_placeholders(&texts[index], &translated);
            if missing.is_empty() {
                outputs[index] = translated;
            } else {
                warn!(
                    "discarding {} translation that lost placeholders: {}",
                    target_language,
                    missing.join(", ")
                );
            }
        }
        outputs
    }
}

fn map_failure(status: StatusCode, message: String, retry_after: Option<Duration>) -> ProviderError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ProviderError::Unauthorized { status, message };
    }
    ProviderError::Http {
        status,
        message,
        retry_after,
    }
}

/// Some models wrap JSON answers in a markdown fence despite the response format.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    /// Answers every request by prefixing each input text with `[fr] `.
    struct PrefixResponder;

    impl Respond for PrefixResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let user = body["messages"][1]["content"].as_str().unwrap();
            let texts: Value = serde_json::from_str(user).unwrap();
            let translations: Vec<String> = texts["texts"]
                .as_array()
                .unwrap()
                .iter()
                .map(|text| format!("[fr] {}", text.as_str().unwrap()))
                .collect();
            ResponseTemplate::new(200).set_body_json(completion(json!({
                "translations": translations
            })))
        }
    }

    fn completion(content: Value) -> Value {
        json!({
            "choices": [ { "message": { "role": "assistant", "content": content.to_string() } } ]
        })
    }

    fn provider(server: &MockServer) -> HttpProvider<RecordingSleeper> {
        let options = ProviderOptions {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            ..ProviderOptions::default()
        };
        HttpProvider::new(&options, "sk-test", "en")
            .unwrap()
            .with_sleeper(RecordingSleeper::default())
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[tokio::test]
    async fn translates_batch_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(PrefixResponder)
            .expect(1)
            .mount(&server)
            .await;

        let output = provider(&server)
            .translate_batch(&texts(&["Hello", "World"]), "fr")
            .await;
        assert_eq!(output, texts(&["[fr] Hello", "[fr] World"]));
    }

    #[tokio::test]
    async fn retries_rate_limited_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(PrefixResponder)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let output = provider.translate_batch(&texts(&["Spend"]), "fr").await;

        assert_eq!(output, texts(&["[fr] Spend"]));
        assert_eq!(
            *provider.sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn returns_source_texts_after_exhausting_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let input = texts(&["Revenue", "Clicks"]);
        let output = provider.translate_batch(&input, "de").await;

        assert_eq!(output, input);
        assert_eq!(
            *provider.sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn rejected_key_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .expect(1)
            .mount(&server)
            .await;

        let input = texts(&["Revenue"]);
        assert_eq!(provider(&server).translate_batch(&input, "de").await, input);
    }

    #[tokio::test]
    async fn length_mismatch_falls_back_to_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(json!({ "translations": ["Seulement un"] }))),
            )
            .mount(&server)
            .await;

        let input = texts(&["One", "Two"]);
        assert_eq!(provider(&server).translate_batch(&input, "fr").await, input);
    }

    #[tokio::test]
    async fn acronyms_and_blank_strings_are_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(PrefixResponder)
            .expect(1)
            .mount(&server)
            .await;

        let output = provider(&server)
            .translate_batch(&texts(&["CTR", "Budget", " ", "ROAS"]), "fr")
            .await;
        assert_eq!(output, texts(&["CTR", "[fr] Budget", " ", "ROAS"]));
    }

    #[tokio::test]
    async fn batch_of_only_acronyms_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(PrefixResponder)
            .expect(0)
            .mount(&server)
            .await;

        let input = texts(&["CPC", "CPM"]);
        assert_eq!(provider(&server).translate_batch(&input, "fr").await, input);
    }

    #[tokio::test]
    async fn translation_losing_placeholders_keeps_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
                "translations": ["Bonjour", "{count} campagnes"]
            }))))
            .mount(&server)
            .await;

        let output = provider(&server)
            .translate_batch(&texts(&["Hello {name}", "{count} campaigns"]), "fr")
            .await;
        assert_eq!(output, texts(&["Hello {name}", "{count} campagnes"]));
    }

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence(" {\"a\":1} "), "{\"a\":1}");
    }
}
