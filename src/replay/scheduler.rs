// Playback loop: advances the session position and pushes frames at the paced rate

use std::time::Duration;

use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::ReplayError;

use super::{
    broadcast::{FrameUpdate, ReplayEvent},
    session::{ReplaySession, SessionInner},
};

enum Step {
    /// A frame was rendered and there is more to play
    Continue(FrameUpdate, f64),
    /// The last reachable frame was rendered
    Finished(FrameUpdate),
}

/// Renders the frame at the current position and moves the position forward by
/// `frame_skip`. Reaching the end stops playback and rewinds to the first frame.
fn advance(inner: &mut SessionInner, frame_skip: usize) -> Result<Step, ReplayError> {
    let index = inner.state.frame_index;
    let update = FrameUpdate::render(index, inner.store.get(index)?, &inner.store);

    let next = index + frame_skip.max(1);
    if next >= inner.store.len() {
        inner.stop_playback();
        inner.state.frame_index = 0;
        Ok(Step::Finished(update))
    } else {
        inner.state.frame_index = next;
        Ok(Step::Continue(update, inner.state.speed))
    }
}

/// Drives one playback run. Exits when `token` is cancelled, when the session is
/// reloaded or evicted (its generation moves past `generation`), or when the end
/// of the sequence is reached.
pub(crate) async fn playback_loop(
    session: ReplaySession,
    token: CancellationToken,
    generation: u64,
) {
    let frame_skip = session.config().frame_skip;
    let base_interval = session.config().base_interval();
    let mut emitted = 0usize;

    loop {
        let wait = {
            let mut inner = session.lock().await;
            if token.is_cancelled() || inner.generation != generation || !inner.state.is_playing {
                break;
            }

            match advance(&mut inner, frame_skip) {
                Ok(Step::Continue(update, speed)) => {
                    session
                        .broadcaster()
                        .send_lossy(ReplayEvent::Frame(Box::new(update)));
                    emitted += 1;
                    pacing_interval(base_interval, speed)
                }
                Ok(Step::Finished(update)) => {
                    session
                        .broadcaster()
                        .send_lossy(ReplayEvent::Frame(Box::new(update)));
                    emitted += 1;
                    session.broadcaster().send_lossy(ReplayEvent::EndOfReplay);
                    info!("Replay ended");
                    break;
                }
                Err(e) => {
                    error!("Replay loop error: {}", e);
                    inner.stop_playback();
                    session.broadcaster().send_lossy(ReplayEvent::Error {
                        message: e.to_string(),
                    });
                    break;
                }
            }
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!("Replay loop stopped after {} frames", emitted);
}

fn pacing_interval(base_interval: Duration, speed: f64) -> Duration {
    if speed.is_finite() && speed > 0.0 {
        base_interval.div_f64(speed)
    } else {
        base_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_interval_scales_with_speed() {
        let base = Duration::from_millis(100);
        assert_eq!(pacing_interval(base, 1.0), Duration::from_millis(100));
        assert_eq!(pacing_interval(base, 2.0), Duration::from_millis(50));
        assert_eq!(pacing_interval(base, 0.25), Duration::from_millis(400));
        assert_eq!(pacing_interval(base, 0.0), base);
    }
}
