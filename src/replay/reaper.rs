// Periodic eviction of idle replay data

use log::{debug, info};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::session::ReplaySession;

/// Background task that frees the loaded frames of a session nobody has touched
/// for longer than the idle timeout. It runs every `reaper_period_s`.
pub struct IdleReaper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl IdleReaper {
    pub fn spawn(session: ReplaySession) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(reaper_loop(session, token.clone()));
        Self { token, handle }
    }

    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn reaper_loop(session: ReplaySession, token: CancellationToken) {
    let period = session.config().reaper_period();
    info!("Idle reaper started, checking every {:?}", period);

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if session.evict_if_idle().await {
                    debug!("Idle reaper evicted replay data");
                }
            }
            _ = token.cancelled() => break,
        }
    }

    info!("Idle reaper stopped");
}
