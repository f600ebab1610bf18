use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use read_aloud::{
    orchestrator::{ReadAloudOrchestrator, ReaderEvent},
    playback::{silent_wav, HeadlessBackend},
    scheduler::HighlightSurface,
    segment::parse_story_with_threshold,
    synthesis::{SpeechSynthesizer, SynthesisRequest, SynthesizedSpeech},
    EngineConfig, ReadError, ReadingMode, WordUnit,
};

const STORY: &str = "The little red fox jumped over the log.\n\
                     She ran to find her friends.\n\n\
                     Magnificent butterflies fluttered through the meadow,\n\
                     painting the morning sky with extraordinary colors.";

/// Stands in for the speech service: silence, roughly as long as the words.
struct OfflineSynthesizer;

#[async_trait]
impl SpeechSynthesizer for OfflineSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech, ReadError> {
        let per_word_ms = match request.mode {
            ReadingMode::Normal => 350,
            ReadingMode::Learning => 600,
        };
        let duration_ms = per_word_ms * request.word_count as u32 + 400;
        let audio = silent_wav(duration_ms, 16_000)
            .map_err(|e| ReadError::Synthesis(e.to_string()))?;
        let rate = match request.mode {
            ReadingMode::Normal => 1.0,
            ReadingMode::Learning => 0.6,
        };
        Ok(SynthesizedSpeech::new(audio).with_playback_rate(rate))
    }
}

struct ConsoleSurface {
    started: Instant,
}

impl HighlightSurface for ConsoleSurface {
    fn apply(&self, word: &WordUnit, mode: ReadingMode) {
        println!(
            "{:>7.2?}  [{}] {} ({}, {mode})",
            self.started.elapsed(),
            word.index,
            word.text,
            word.category
        );
    }

    fn clear(&self, _word: &WordUnit) {}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let synthesizer: Arc<dyn SpeechSynthesizer> = match std::env::var("READ_ALOUD_SERVER") {
        Ok(url) => {
            use read_aloud::synthesis::{http::HttpSpeechClient, VoiceDirectory};
            let client = HttpSpeechClient::new(url)?;
            let voices = client.list_voices().await?;
            println!("Available voices: {:?}", voices);
            Arc::new(client)
        }
        Err(_) => Arc::new(OfflineSynthesizer),
    };
    let voice = std::env::var("READ_ALOUD_VOICE").unwrap_or_else(|_| "offline".to_string());

    let config = match std::env::var("READ_ALOUD_CONFIG") {
        Ok(path) => EngineConfig::from_json_file(std::path::Path::new(&path))?,
        Err(_) => EngineConfig::default(),
    };
    let threshold = config.complexity_length_threshold;

    let orchestrator = ReadAloudOrchestrator::new(
        synthesizer,
        Arc::new(HeadlessBackend::new()),
        Arc::new(ConsoleSurface {
            started: Instant::now(),
        }),
        config,
    )?;
    orchestrator.set_voice(voice);
    let mut events = orchestrator.subscribe();

    for segment in parse_story_with_threshold(STORY, threshold) {
        let analysis = segment.analysis();
        println!(
            "\n{}: {} words, {}% sight words, {} -> {} mode",
            segment.id,
            analysis.word_count,
            analysis.sight_word_ratio,
            analysis.difficulty,
            analysis.recommended_reading_mode
        );

        orchestrator.set_mode(analysis.recommended_reading_mode);
        orchestrator.read_segment(&segment);

        loop {
            match events.recv().await? {
                ReaderEvent::ReadEnded { segment_id } => {
                    println!("Finished {segment_id}");
                    break;
                }
                ReaderEvent::ReadFailed {
                    segment_id,
                    message,
                    hint,
                    ..
                } => {
                    println!("{segment_id} failed: {message}");
                    if let Some(hint) = hint {
                        println!("  {hint}");
                    }
                    break;
                }
                _ => {}
            }
        }
    }

    Ok(())
}
