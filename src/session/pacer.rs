//! Fixed-rate frame pacing.
//!
//! Ticks come from a `tokio::time::Interval`, so processing time inside a
//! tick never pushes later frames back. Missed ticks are skipped rather
//! than burst.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Interval, MissedTickBehavior};

use crate::error::Result;
use crate::media::{Frame, FrameSource};

/// Releases frames from a source at the source's interval.
pub struct Pacer {
    source: FrameSource,
    ticker: Interval,
    finished: bool,
}

impl Pacer {
    /// Wait for `ready`, then arm the timer. The first frame is released
    /// immediately after arming.
    pub async fn arm(source: FrameSource, ready: impl Future<Output = ()>) -> Self {
        ready.await;
        let mut ticker = time::interval(source.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            source,
            ticker,
            finished: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.ticker.period()
    }

    /// Wait for the next tick and read one frame. Once the source reports
    /// end of stream it is never read again.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        self.ticker.tick().await;
        let frame = self.source.next_frame()?;
        if frame.is_none() {
            self.finished = true;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CodecFamily;
    use std::io::Cursor;
    use tokio::time::Instant;

    fn annexb_source(count: usize) -> FrameSource {
        let mut stream = Vec::new();
        for i in 0..count {
            stream.extend_from_slice(&[0, 0, 0, 1, 0x41, i as u8 + 1]);
        }
        FrameSource::from_reader(CodecFamily::H264, Cursor::new(stream)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_released_on_schedule() {
        let start = Instant::now();
        let mut pacer = Pacer::arm(annexb_source(4), async {}).await;
        assert_eq!(pacer.interval(), Duration::from_millis(33));

        let mut released = Vec::new();
        while let Some(frame) = pacer.next_frame().await.unwrap() {
            released.push((start.elapsed(), frame.payload));
        }

        assert_eq!(released.len(), 4);
        for (i, (at, payload)) in released.iter().enumerate() {
            assert_eq!(*at, Duration::from_millis(33) * i as u32);
            assert_eq!(payload, &vec![0x41, i as u8 + 1]);
        }
        // Exhausted pacers return immediately without waiting for a tick
        let before = Instant::now();
        assert!(pacer.next_frame().await.unwrap().is_none());
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_does_not_drift() {
        let start = Instant::now();
        let mut pacer = Pacer::arm(annexb_source(3), async {}).await;

        pacer.next_frame().await.unwrap();
        // Processing shorter than one interval keeps the phase
        time::sleep(Duration::from_millis(20)).await;
        pacer.next_frame().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(33));

        time::sleep(Duration::from_millis(10)).await;
        pacer.next_frame().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(66));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_for_ready() {
        let start = Instant::now();
        let ready = time::sleep(Duration::from_millis(500));
        let mut pacer = Pacer::arm(annexb_source(1), ready).await;
        assert!(pacer.next_frame().await.unwrap().is_some());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }
}
