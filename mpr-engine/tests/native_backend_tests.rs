//! Native Backend Playback Tests
//!
//! Plays generated WAV files through the symphonia backend and the built-in
//! output drivers, checking sample conservation, positioning and gain.

mod helpers;

use helpers::audio_generator::{
    generate_multichannel_wav, generate_sine_wav, wav_frames, wav_peak, TEST_SAMPLE_RATE,
};
use helpers::wait_for_end;
use mpr_common::{EndReason, PlaybackState};
use mpr_engine::backend::Backend;
use mpr_engine::position::{self, SeekTarget};
use mpr_engine::{EngineConfig, MediaSession, NativeBackend, PlaybackEngine};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

fn native_session(path: &Path) -> Arc<MediaSession> {
    MediaSession::open_file(path, Arc::new(NativeBackend::new()) as Arc<dyn Backend>).unwrap()
}

fn wav_config(output: &Path) -> EngineConfig {
    EngineConfig::from_toml_str(&format!(
        "[output]\ndriver = \"wav\"\ndevice = \"{}\"\n",
        output.display()
    ))
    .unwrap()
}

#[test]
fn test_play_wav_through_discard_driver() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tone.wav");
    generate_sine_wav(&source, 500, 440.0, 0.5).unwrap();

    let session = native_session(&source);
    let engine = PlaybackEngine::new(EngineConfig::from_toml_str("[output]\ndriver = \"discard\"\n").unwrap());
    let events = engine.subscribe();

    engine.play(&session).unwrap();
    assert_eq!(wait_for_end(&events, TIMEOUT), Some(EndReason::Finished));

    assert_eq!(session.state(), PlaybackState::Stopped);
    let format = session.current_format().unwrap();
    assert_eq!((format.rate, format.channels), (TEST_SAMPLE_RATE as i64, 2));
    assert_eq!(position::current_duration(&session).unwrap(), TEST_SAMPLE_RATE as i64 / 2);
}

#[test]
fn test_wav_driver_receives_every_frame() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tone.wav");
    let output = dir.path().join("out.wav");
    generate_sine_wav(&source, 1000, 440.0, 0.5).unwrap();

    let session = native_session(&source);
    let engine = PlaybackEngine::new(wav_config(&output));
    let events = engine.subscribe();

    engine.play(&session).unwrap();
    assert_eq!(wait_for_end(&events, TIMEOUT), Some(EndReason::Finished));
    session.close();

    assert_eq!(wav_frames(&output).unwrap(), wav_frames(&source).unwrap());
    let reader = hound::WavReader::open(&output).unwrap();
    assert_eq!(reader.spec().sample_rate, TEST_SAMPLE_RATE);
    assert_eq!(reader.spec().channels, 2);
}

#[test]
fn test_volume_scales_rendered_samples() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tone.wav");
    let output = dir.path().join("half.wav");
    generate_sine_wav(&source, 300, 440.0, 0.8).unwrap();

    let session = native_session(&source);
    let engine = PlaybackEngine::new(wav_config(&output));
    let events = engine.subscribe();

    engine.set_volume(&session, 0.5, false).unwrap();
    engine.play(&session).unwrap();
    assert_eq!(wait_for_end(&events, TIMEOUT), Some(EndReason::Finished));
    session.close();

    let source_peak = wav_peak(&source).unwrap();
    let output_peak = wav_peak(&output).unwrap();
    let ratio = output_peak as f64 / source_peak as f64;
    assert!((ratio - 0.5).abs() < 0.01, "peak ratio {}", ratio);
}

#[test]
fn test_rva_attenuates_rendered_samples() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tone.wav");
    let output = dir.path().join("rva.wav");
    generate_sine_wav(&source, 300, 440.0, 0.8).unwrap();

    let backend = Arc::new(NativeBackend::new());
    backend.set_rva_db(-6.0206);
    let session = MediaSession::open_file(&source, Arc::clone(&backend) as Arc<dyn Backend>).unwrap();
    let engine = PlaybackEngine::new(wav_config(&output));
    let events = engine.subscribe();

    engine.set_volume(&session, 1.0, false).unwrap();
    let volume = engine.get_volume(&session);
    assert!((volume.rva_db + 6.0206).abs() < 1e-9);
    assert!((volume.actual - 0.5).abs() < 1e-3, "actual volume {}", volume.actual);

    engine.play(&session).unwrap();
    assert_eq!(wait_for_end(&events, TIMEOUT), Some(EndReason::Finished));
    session.close();

    let ratio = wav_peak(&output).unwrap() as f64 / wav_peak(&source).unwrap() as f64;
    assert!((ratio - 0.5).abs() < 0.01, "peak ratio {}", ratio);
}

#[test]
fn test_seek_on_native_backend() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tone.wav");
    generate_sine_wav(&source, 1000, 440.0, 0.5).unwrap();

    let session = native_session(&source);

    assert_eq!(position::total_length(&session).unwrap(), Some(TEST_SAMPLE_RATE as i64));
    position::seek_to(&session, SeekTarget::Samples(22_050)).unwrap();
    assert_eq!(position::current_duration(&session).unwrap(), 22_050);
    position::seek_to(&session, SeekTarget::Seconds(0.25)).unwrap();
    assert_eq!(position::current_duration(&session).unwrap(), 11_025);
}

#[test]
fn test_seek_then_play_renders_remainder() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tone.wav");
    let output = dir.path().join("tail.wav");
    generate_sine_wav(&source, 1000, 440.0, 0.5).unwrap();

    let session = native_session(&source);
    let engine = PlaybackEngine::new(wav_config(&output));
    let events = engine.subscribe();

    position::seek_to(&session, SeekTarget::Samples(33_075)).unwrap();
    engine.play(&session).unwrap();
    assert_eq!(wait_for_end(&events, TIMEOUT), Some(EndReason::Finished));
    session.close();

    assert_eq!(wav_frames(&output).unwrap(), TEST_SAMPLE_RATE - 33_075);
}

#[test]
fn test_six_channel_file_plays_folded_to_stereo() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("surround.wav");
    let output = dir.path().join("folded.wav");
    generate_multichannel_wav(&source, 500, 6, 440.0, 0.5).unwrap();

    let session = native_session(&source);
    let engine = PlaybackEngine::new(wav_config(&output));
    let events = engine.subscribe();

    engine.play(&session).unwrap();
    assert_eq!(wait_for_end(&events, TIMEOUT), Some(EndReason::Finished));

    let format = session.current_format().unwrap();
    assert_eq!(format.channels, 2);
    session.close();

    let reader = hound::WavReader::open(&output).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.duration(), TEST_SAMPLE_RATE / 2);
    assert!(wav_peak(&output).unwrap() > 0);
}

#[test]
fn test_missing_file_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let result = MediaSession::open_file(
        dir.path().join("missing.mp3"),
        Arc::new(NativeBackend::new()) as Arc<dyn Backend>,
    );
    assert!(result.is_err());
}
