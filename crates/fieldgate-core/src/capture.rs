//! Audio stream capture to a WAV file.
//!
//! The capture loop subscribes to the resolved audio characteristic,
//! drains the [`AudioRing`] on a short poll interval, and writes
//! 16-bit-aligned PCM bytes behind a standard 44-byte WAV header. The
//! header is written as a placeholder up front and finalized with the
//! true sample count only after the capture succeeds; failed or
//! undersized captures delete the output file.

use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fieldgate_types::{AudioEndpoint, CaptureSummary};

use crate::central::CentralConnection;
use crate::error::{Error, Result};
use crate::ring::AudioRing;

/// Size of the PCM WAV container header.
pub const WAV_HEADER_SIZE: u64 = 44;

/// Timing knobs for the drain loop. Defaults match live BLE captures;
/// tests shorten them to keep runtime down.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Longest capture a caller may request.
    pub max_duration: Duration,
    /// Failure deadline for the first audio packet after subscribing.
    pub startup_timeout: Duration,
    /// Failure deadline for stream silence after the first packet.
    pub inactivity_timeout: Duration,
    /// Residual drain window after the timed loop ends.
    pub grace: Duration,
    /// Drain loop poll interval.
    pub poll_interval: Duration,
    /// Minimum PCM payload for a capture to count as successful.
    pub min_audio_bytes: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(300),
            startup_timeout: Duration::from_secs(3),
            inactivity_timeout: Duration::from_secs(2),
            grace: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            min_audio_bytes: 1024,
        }
    }
}

/// Carries a single unpaired byte across drain iterations so 16-bit
/// sample boundaries survive packets that split samples at odd offsets.
#[derive(Debug, Default)]
pub struct SampleAligner {
    pending: Option<u8>,
}

impl SampleAligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine the pending byte (if any) with `input` and return the
    /// even-length prefix to write, stashing a new trailing byte when
    /// the combined length is odd.
    pub fn align(&mut self, input: &[u8]) -> Vec<u8> {
        let mut combined = Vec::with_capacity(input.len() + 1);
        if let Some(b) = self.pending.take() {
            combined.push(b);
        }
        combined.extend_from_slice(input);
        if combined.len() % 2 != 0 {
            self.pending = combined.pop();
        }
        combined
    }

    /// Whether an unpaired byte is still pending.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Write the 44-byte RIFF/WAVE header for mono 16-bit PCM.
///
/// `data_len` is the PCM payload size; pass 0 for the placeholder and
/// call again with the true size once capture completes.
fn write_wav_header(file: &mut File, sample_rate: u32, data_len: u32) -> std::io::Result<()> {
    let byte_rate = sample_rate * 2; // mono, 16-bit
    let mut header = [0u8; WAV_HEADER_SIZE as usize];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&1u16.to_le_bytes()); // mono
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&2u16.to_le_bytes()); // block align
    header[34..36].copy_from_slice(&16u16.to_le_bytes()); // bits per sample
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)
}

pub(crate) fn validate(path: &Path, duration: Duration, options: &CaptureOptions) -> Result<()> {
    if path.as_os_str().is_empty() || !path.is_absolute() {
        return Err(Error::invalid_config(format!(
            "Capture path must be absolute, got {}",
            path.display()
        )));
    }
    if duration.is_zero() || duration > options.max_duration {
        return Err(Error::invalid_config(format!(
            "Capture duration must be within (0, {:?}], got {:?}",
            options.max_duration, duration
        )));
    }
    Ok(())
}

/// Record the audio notification stream to `path` for up to `duration`.
///
/// Runs until the duration elapses or `stop` is cancelled; a detected
/// disconnect, a silent stream, or too little data is a hard failure
/// that removes the output file.
pub async fn record_to_wav(
    conn: &Arc<dyn CentralConnection>,
    endpoint: &AudioEndpoint,
    ring: &Arc<AudioRing>,
    path: &Path,
    duration: Duration,
    sample_rate: u32,
    stop: &CancellationToken,
    options: &CaptureOptions,
) -> Result<CaptureSummary> {
    validate(path, duration, options)?;

    let mut file = File::create(path)?;
    write_wav_header(&mut file, sample_rate, 0)?;

    ring.activate();
    let ring_sink = Arc::clone(ring);
    if let Err(err) = conn
        .subscribe(
            endpoint.characteristic,
            Box::new(move |data| ring_sink.push(data)),
        )
        .await
    {
        ring.deactivate();
        drop(file);
        remove_output(path);
        return Err(err);
    }

    info!(
        path = %path.display(),
        characteristic = %endpoint.characteristic,
        ?duration,
        "Starting audio capture"
    );

    let result = drain_loop(conn, ring, &mut file, duration, stop, options).await;

    if let Err(err) = conn.unsubscribe(endpoint.characteristic).await {
        debug!(error = %err, "Unsubscribe after capture failed");
    }
    ring.deactivate();

    let data_bytes = match result {
        Ok(n) => n,
        Err(err) => {
            drop(file);
            remove_output(path);
            return Err(err);
        }
    };

    if data_bytes < options.min_audio_bytes {
        drop(file);
        remove_output(path);
        return Err(Error::stream(format!(
            "Capture too short: {data_bytes} audio bytes (minimum {})",
            options.min_audio_bytes
        )));
    }

    if let Err(err) = write_wav_header(&mut file, sample_rate, data_bytes as u32)
        .and_then(|()| file.sync_all())
    {
        drop(file);
        remove_output(path);
        return Err(err.into());
    }

    let stats = ring.stats();
    let note = (stats.dropped > 0).then(|| {
        warn!(dropped = stats.dropped, "Ring buffer overflowed during capture");
        format!("{} bytes dropped during capture", stats.dropped)
    });

    info!(bytes = data_bytes + WAV_HEADER_SIZE, "Audio capture complete");
    Ok(CaptureSummary {
        bytes_written: data_bytes + WAV_HEADER_SIZE,
        received_bytes: stats.received,
        dropped_bytes: stats.dropped,
        note,
    })
}

/// The timed drain loop plus the post-loop grace drain. Returns the
/// PCM payload byte count written behind the header.
async fn drain_loop(
    conn: &Arc<dyn CentralConnection>,
    ring: &Arc<AudioRing>,
    file: &mut File,
    duration: Duration,
    stop: &CancellationToken,
    options: &CaptureOptions,
) -> Result<u64> {
    let started = Instant::now();
    let mut aligner = SampleAligner::new();
    let mut scratch = vec![0u8; 4096];
    let mut written: u64 = 0;

    loop {
        sleep(options.poll_interval).await;

        loop {
            let n = ring.drain(&mut scratch);
            if n == 0 {
                break;
            }
            let aligned = aligner.align(&scratch[..n]);
            file.write_all(&aligned)?;
            written += aligned.len() as u64;
        }

        if started.elapsed() >= duration || stop.is_cancelled() {
            break;
        }
        if !conn.is_connected().await {
            return Err(Error::LinkLost);
        }
        match ring.last_packet() {
            None => {
                if started.elapsed() >= options.startup_timeout {
                    return Err(Error::stream("No audio packets received"));
                }
            }
            Some(last) => {
                if last.elapsed() >= options.inactivity_timeout {
                    return Err(Error::stream(format!(
                        "Audio stream stalled after {written} bytes"
                    )));
                }
            }
        }
    }

    // Grace drain flushes packets still in flight when the timer fired.
    let grace_end = Instant::now() + options.grace;
    while Instant::now() < grace_end {
        sleep(options.poll_interval).await;
        loop {
            let n = ring.drain(&mut scratch);
            if n == 0 {
                break;
            }
            let aligned = aligner.align(&scratch[..n]);
            file.write_all(&aligned)?;
            written += aligned.len() as u64;
        }
    }

    if aligner.has_pending() {
        debug!("Discarding trailing unpaired byte");
    }
    Ok(written)
}

fn remove_output(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %err, "Failed to remove partial capture");
    }
}
