//! Liveness spinner shown while a stage runs.

use std::io::Write;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(150);

/// A background task redrawing one status line until stopped.
///
/// It only ever reads its stop signal.
#[derive(Debug)]
pub struct Spinner {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Spinner {
    /// Starts drawing `[RUN ] <label> <frame>`.
    pub fn start(label: &str) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let message = format!("[RUN ] {label} ");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            let mut frames = FRAMES.iter().cycle();
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let frame = frames.next().copied().unwrap_or('|');
                        let mut out = std::io::stdout();
                        let _ = write!(out, "\r{message}{frame}");
                        let _ = out.flush();
                    }
                }
            }
            let mut out = std::io::stdout();
            let _ = write!(out, "\r{}\r", " ".repeat(message.len() + 2));
            let _ = out.flush();
        });
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Stops the spinner and clears its line.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.handle.await;
    }
}
