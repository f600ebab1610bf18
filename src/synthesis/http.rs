use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use super::{SpeechSynthesizer, SynthesisRequest, SynthesizedSpeech, Voice, VoiceDirectory};
use crate::error::ReadError;

pub const HEADER_ERROR: &str = "X-Error";
pub const HEADER_PLAYBACK_RATE: &str = "X-Playback-Rate";
pub const HEADER_WORD_COUNT: &str = "X-Word-Count";
pub const HEADER_READING_MODE: &str = "X-Reading-Mode";
pub const HEADER_EFFECTIVE_RATE: &str = "X-Effective-Rate";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct ReadBody<'a> {
    text: &'a str,
    voice: &'a str,
    reading_mode: &'a str,
    reading_speed: f64,
}

#[derive(Debug, Deserialize)]
struct VoiceList {
    #[serde(default)]
    voices: Vec<Voice>,
}

/// Attributes the speech service attaches to a response.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechHeaders {
    pub error: Option<String>,
    pub playback_rate: f32,
    pub word_count: Option<usize>,
    pub reading_mode: Option<String>,
    pub effective_rate: Option<f32>,
}

impl SpeechHeaders {
    /// Read the response headers. Bad numeric values fall back to defaults.
    pub fn parse(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let playback_rate = match text(HEADER_PLAYBACK_RATE) {
            None => 1.0,
            Some(raw) => match raw.parse::<f32>() {
                Ok(rate) if rate.is_finite() && rate > 0.0 => rate,
                _ => {
                    log::warn!("Ignoring unusable {HEADER_PLAYBACK_RATE} {raw:?}, using 1.0");
                    1.0
                }
            },
        };

        let word_count = text(HEADER_WORD_COUNT).and_then(|raw| match raw.parse::<usize>() {
            Ok(count) => Some(count),
            Err(_) => {
                log::warn!("Ignoring unusable {HEADER_WORD_COUNT} {raw:?}");
                None
            }
        });

        Self {
            error: text(HEADER_ERROR).map(str::to_string),
            playback_rate,
            word_count,
            reading_mode: text(HEADER_READING_MODE).map(str::to_string),
            effective_rate: text(HEADER_EFFECTIVE_RATE).and_then(|raw| raw.parse().ok()),
        }
    }
}

/// Speech service client over HTTP.
///
/// - `POST {base}/read` with `{text, voice, reading_mode, reading_speed}`,
///   answered with the audio body and the `X-*` headers
/// - `GET {base}/get_voices`, answered with `{"voices": [{"id", "name"}]}`
#[derive(Debug, Clone)]
pub struct HttpSpeechClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSpeechClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ReadError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ReadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::from_client(client, base_url))
    }

    pub fn from_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech, ReadError> {
        log::info!(
            "Requesting speech: {} words, voice={}, mode={}",
            request.word_count,
            request.voice_id,
            request.mode
        );

        let body = ReadBody {
            text: &request.text,
            voice: &request.voice_id,
            reading_mode: request.mode.as_str(),
            reading_speed: request.speed_multiplier,
        };
        let response = self.client.post(self.url("read")).json(&body).send().await?;

        let status = response.status();
        let headers = SpeechHeaders::parse(response.headers());

        // the error indicator wins over the status code
        if let Some(error) = headers.error {
            log::error!("Speech service reported an error: {error}");
            return Ok(SynthesizedSpeech::failed(error));
        }

        if !status.is_success() {
            let message = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    log::warn!("Could not read error body of {status} response: {e}");
                    String::new()
                }
            };
            return Err(ReadError::Transport {
                status: Some(status.as_u16()),
                message: if message.trim().is_empty() {
                    status.to_string()
                } else {
                    message.trim().to_string()
                },
            });
        }

        if let Some(echoed) = headers.word_count {
            if echoed != request.word_count {
                log::warn!(
                    "Service counted {echoed} words, highlighting {}",
                    request.word_count
                );
            }
        }
        log::debug!(
            "Speech headers: playback_rate={}, mode={:?}, effective_rate={:?}",
            headers.playback_rate,
            headers.reading_mode,
            headers.effective_rate
        );

        let audio = response.bytes().await?;
        Ok(SynthesizedSpeech {
            audio,
            playback_rate: headers.playback_rate,
            error: None,
            word_count: headers.word_count,
        })
    }
}

#[async_trait]
impl VoiceDirectory for HttpSpeechClient {
    async fn list_voices(&self) -> Result<Vec<Voice>, ReadError> {
        let response = self
            .client
            .get(self.url("get_voices"))
            .send()
            .await?
            .error_for_status()?;
        let list: VoiceList = response.json().await?;
        log::info!("Loaded {} voices", list.voices.len());
        Ok(list.voices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadingMode;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn speech_request() -> SynthesisRequest {
        SynthesisRequest {
            text: "The cat sat.".into(),
            voice_id: "v1".into(),
            mode: ReadingMode::Learning,
            speed_multiplier: 1.0,
            word_count: 3,
        }
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn parses_full_header_set() {
        let parsed = SpeechHeaders::parse(&headers(&[
            ("x-playback-rate", "0.6"),
            ("x-word-count", "12"),
            ("x-reading-mode", "learning"),
            ("x-effective-rate", "0.75"),
        ]));
        assert_eq!(parsed.playback_rate, 0.6);
        assert_eq!(parsed.word_count, Some(12));
        assert_eq!(parsed.reading_mode.as_deref(), Some("learning"));
        assert_eq!(parsed.effective_rate, Some(0.75));
        assert_eq!(parsed.error, None);
    }

    #[test]
    fn missing_or_bad_rate_falls_back_to_one() {
        assert_eq!(SpeechHeaders::parse(&HeaderMap::new()).playback_rate, 1.0);
        for bad in ["fast", "0", "-2", "NaN", ""] {
            let parsed = SpeechHeaders::parse(&headers(&[("x-playback-rate", bad)]));
            assert_eq!(parsed.playback_rate, 1.0, "{bad:?}");
        }
    }

    #[test]
    fn unparseable_word_count_is_ignored() {
        let parsed = SpeechHeaders::parse(&headers(&[("x-word-count", "many")]));
        assert_eq!(parsed.word_count, None);
    }

    #[test]
    fn error_indicator_is_read() {
        let parsed = SpeechHeaders::parse(&headers(&[("x-error", "Voice not found")]));
        assert_eq!(parsed.error.as_deref(), Some("Voice not found"));
    }

    #[test]
    fn read_body_uses_service_field_names() {
        let body = ReadBody {
            text: "The cat sat.",
            voice: "v1",
            reading_mode: "learning",
            reading_speed: 1.0,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "text": "The cat sat.",
                "voice": "v1",
                "reading_mode": "learning",
                "reading_speed": 1.0
            })
        );
    }

    #[test]
    fn voice_list_tolerates_empty_payload() {
        let list: VoiceList = serde_json::from_str("{}").expect("parse");
        assert!(list.voices.is_empty());
        let list: VoiceList =
            serde_json::from_str(r#"{"voices":[{"id":"v1","name":"Rachel"}]}"#).expect("parse");
        assert_eq!(
            list.voices,
            vec![Voice {
                id: "v1".into(),
                name: "Rachel".into()
            }]
        );
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = HttpSpeechClient::new("http://localhost:5000/").expect("client");
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url("read"), "http://localhost:5000/read");
    }

    #[tokio::test]
    async fn synthesize_returns_audio_and_rate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/read"))
            .and(body_json(serde_json::json!({
                "text": "The cat sat.",
                "voice": "v1",
                "reading_mode": "learning",
                "reading_speed": 1.0
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Playback-Rate", "0.6")
                    .insert_header("X-Word-Count", "3")
                    .set_body_bytes(vec![1u8, 2, 3, 4]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSpeechClient::new(server.uri()).expect("client");
        let speech = client.synthesize(&speech_request()).await.expect("speech");
        assert_eq!(&speech.audio[..], &[1u8, 2, 3, 4][..]);
        assert_eq!(speech.playback_rate, 0.6);
        assert_eq!(speech.word_count, Some(3));
        assert_eq!(speech.error, None);
    }

    #[tokio::test]
    async fn error_header_wins_over_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/read"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Error", "Voice not found")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let client = HttpSpeechClient::new(server.uri()).expect("client");
        let speech = client.synthesize(&speech_request()).await.expect("response");
        assert_eq!(speech.error.as_deref(), Some("Voice not found"));
        assert!(speech.audio.is_empty());
    }

    #[tokio::test]
    async fn failed_status_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/read"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Speech generation failed\n"))
            .mount(&server)
            .await;

        let client = HttpSpeechClient::new(server.uri()).expect("client");
        match client.synthesize(&speech_request()).await {
            Err(ReadError::Transport { status, message }) => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "Speech generation failed");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn lists_voices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "voices": [{"id": "v1", "name": "Rachel"}, {"id": "v2", "name": "Adam"}]
            })))
            .mount(&server)
            .await;

        let client = HttpSpeechClient::new(server.uri()).expect("client");
        let voices = client.list_voices().await.expect("voices");
        let ids: Vec<&str> = voices.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn failed_voice_listing_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_voices"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpSpeechClient::new(server.uri()).expect("client");
        let err = client.list_voices().await.expect_err("service unavailable");
        assert!(
            matches!(err, ReadError::Transport { status: Some(503), .. }),
            "{err:?}"
        );
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
    }
}
