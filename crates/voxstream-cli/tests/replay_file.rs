//! End-to-end replay of a PCM file through the stand-in engines running on
//! the worker pools.

use std::io::Write;

use serde_json::Value;
use voxstream_cli::{ReplayOptions, replay};
use voxstream_core::Settings;

const RATE: usize = 16_000;

fn tone(ms: usize, amplitude: i16) -> Vec<u8> {
    amplitude.to_le_bytes().repeat(RATE * ms / 1000)
}

fn options() -> ReplayOptions {
    ReplayOptions {
        say: "hello there".into(),
        chunk_ms: 20,
        realtime: false,
        vad_sensitivity: 0.5,
        declared_rate: None,
        mute: false,
        openai_api_key: None,
    }
}

fn parse_lines(out: &[u8]) -> Vec<Value> {
    std::str::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn replaying_one_utterance_produces_a_full_turn() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&tone(600, 8_000)).unwrap();
    file.write_all(&tone(600, 0)).unwrap();
    file.flush().unwrap();
    let audio = tokio::fs::read(file.path()).await.unwrap();

    let mut out = Vec::new();
    let summary = replay(Settings::default(), &audio, &options(), None, &mut out)
        .await
        .unwrap();

    assert_eq!(summary.final_transcripts, 1);
    assert_eq!(summary.replies, 1);
    assert_eq!(summary.errors, 0);
    assert!(summary.partial_transcripts >= 1);

    let events = parse_lines(&out);
    assert_eq!(events.len(), summary.events);

    let finals: Vec<&Value> = events
        .iter()
        .filter(|e| e["type"] == "final_transcript")
        .collect();
    assert_eq!(finals[0]["text"], "hello there");
    assert_eq!(finals[0]["id"], "utt-1");

    let reply: String = events
        .iter()
        .filter(|e| e["type"] == "llm_token" && e["done"] == false)
        .filter_map(|e| e["text"].as_str())
        .collect();
    assert_eq!(reply.trim(), "hello there");

    // "hello there" is two words: two beeps in one phrase.
    assert!(summary.audio_chunks >= 1);
    let chunks: Vec<&Value> = events.iter().filter(|e| e["type"] == "tts_chunk").collect();
    assert_eq!(chunks.len(), summary.audio_chunks);
    assert!(chunks.iter().all(|c| c["seq"] == 1 && c["mime"] == "audio/wav"));
    assert_eq!(chunks[0]["index"], 0);
    assert!(events.iter().any(|e| e["type"] == "tts_phrase_done"));

    let len = events.len();
    assert_eq!(events[len - 2]["type"], "tts_complete");
    let last = &events[len - 1];
    assert_eq!(last["type"], "llm_token");
    assert_eq!(last["done"], true);
}

#[tokio::test]
async fn muted_replay_sends_no_audio() {
    let mut audio = tone(600, 8_000);
    audio.extend(tone(600, 0));
    let options = ReplayOptions {
        mute: true,
        ..options()
    };

    let mut out = Vec::new();
    let summary = replay(Settings::default(), &audio, &options, None, &mut out)
        .await
        .unwrap();

    assert_eq!(summary.replies, 1);
    assert_eq!(summary.audio_chunks, 0);
    let events = parse_lines(&out);
    assert!(events.iter().all(|e| e["type"] != "tts_chunk"));
    assert!(events.iter().any(|e| e["type"] == "tts_complete"));
}

#[tokio::test]
async fn small_chunk_budget_splits_the_phrase_audio() {
    let mut audio = tone(600, 8_000);
    audio.extend(tone(600, 0));
    let settings = Settings {
        tts_chunk_bytes: 1_024,
        asr_workers: 2,
        ..Settings::default()
    };

    let mut out = Vec::new();
    let summary = replay(settings, &audio, &options(), None, &mut out)
        .await
        .unwrap();

    let events = parse_lines(&out);
    let indexes: Vec<u64> = events
        .iter()
        .filter(|e| e["type"] == "tts_chunk")
        .filter_map(|e| e["index"].as_u64())
        .collect();
    assert_eq!(indexes.len(), summary.audio_chunks);
    assert!(indexes.len() > 1);
    assert_eq!(indexes, (0..indexes.len() as u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn silence_only_produces_no_turn() {
    let audio = tone(1_000, 0);
    let mut out = Vec::new();
    let summary = replay(Settings::default(), &audio, &options(), None, &mut out)
        .await
        .unwrap();

    assert_eq!(summary.events, 0);
    assert!(out.is_empty());
}

#[test]
fn declared_rate_mismatch_is_reported() {
    let mut out = Vec::new();
    let options = ReplayOptions {
        declared_rate: Some(48_000),
        ..options()
    };

    let summary = tokio_test::block_on(replay(
        Settings::default(),
        &[],
        &options,
        None,
        &mut out,
    ))
    .unwrap();

    assert_eq!(summary.events, 1);
    let events = parse_lines(&out);
    assert_eq!(events[0]["type"], "info");
    assert_eq!(
        events[0]["message"],
        "Server expects 16000Hz; received 48000Hz."
    );
}
