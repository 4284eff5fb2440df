//! Testing utilities for AgeLens workspace
//!
//! Shared fakes and image fixtures.

#![allow(missing_docs)]

use agelens_model::{AgeStage, Descriptor, DescriptorBuilder, ImageBytes};
use agelens_synthesis::{SynthesisAdapter, UpstreamError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, Semaphore};

/// Encode a solid-colour PNG
pub fn sample_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn descriptor(name: &str) -> Descriptor {
    DescriptorBuilder::new().build(name).unwrap()
}

/// In-process provider that records every call
///
/// Each call returns a distinct PNG whose colour depends on the descriptor
/// seed, the stage and the call number, so a second upstream call for the same
/// key never returns the same bytes.
#[derive(Debug, Default)]
pub struct FakeAdapter {
    calls: Mutex<Vec<(Descriptor, AgeStage)>>,
    counter: AtomicUsize,
    failures: Mutex<VecDeque<UpstreamError>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    barrier: Option<Arc<Barrier>>,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block every call until a permit is added to `gate`
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Rendezvous every call on `barrier`
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Queue an error for the next call; queued errors are consumed in order
    pub fn fail_next(&self, err: UpstreamError) {
        self.failures.lock().push_back(err);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<(Descriptor, AgeStage)> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, stage: AgeStage) -> usize {
        self.calls.lock().iter().filter(|(_, s)| *s == stage).count()
    }

    /// Wait until at least `n` calls have started
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1_000 {
            if self.call_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {n} adapter calls, saw {}", self.call_count());
    }
}

#[async_trait]
impl SynthesisAdapter for FakeAdapter {
    async fn generate(
        &self,
        descriptor: &Descriptor,
        stage: AgeStage,
    ) -> Result<ImageBytes, UpstreamError> {
        self.calls.lock().push((descriptor.clone(), stage));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.failures.lock().pop_front();
        if let Some(err) = queued {
            return Err(err);
        }

        let seed = descriptor.seed().to_le_bytes();
        let stage_index = AgeStage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
        let rgb = [
            seed[0],
            seed[1].wrapping_add(u8::try_from(stage_index).unwrap() * 60),
            u8::try_from(n % 256).unwrap(),
        ];
        Ok(ImageBytes::from(sample_png(32, 24, rgb)))
    }
}
