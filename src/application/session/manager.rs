use super::{SessionEvent, SignalService};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const SESSION_QUEUE: usize = 32;

struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

type SessionMap = Arc<Mutex<HashMap<i64, SessionHandle>>>;

/// Routes events to one sequential task per chat.
///
/// Events for the same chat are handled in arrival order; different chats
/// run independently. Dispatch never waits on a session: a chat whose queue
/// is full gets a busy reply and the event is dropped. A session with no
/// events for `idle_timeout` ends, taking its context with it.
pub struct SessionManager {
    service: Arc<SignalService>,
    sessions: SessionMap,
    idle_timeout: Duration,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(service: Arc<SignalService>, idle_timeout: Duration) -> Self {
        Self {
            service,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
            next_id: AtomicU64::new(0),
        }
    }

    pub async fn dispatch(&self, chat_id: i64, event: SessionEvent) {
        let mut sessions = self.sessions.lock().await;

        let event = match sessions.get(&chat_id) {
            Some(handle) => match handle.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(event)) => {
                    warn!("Session {} queue full, dropping {:?}", chat_id, event);
                    let service = self.service.clone();
                    tokio::spawn(async move { service.notify_busy(chat_id).await });
                    return;
                }
                Err(TrySendError::Closed(event)) => {
                    warn!("Session {} task ended, restarting", chat_id);
                    event
                }
            },
            None => event,
        };

        let handle = self.spawn_session(chat_id);
        if handle.tx.try_send(event).is_err() {
            error!("Session {} rejected its first event", chat_id);
        }
        sessions.insert(chat_id, handle);
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Closes every session queue and waits for queued events to finish.
    pub async fn shutdown(&self) {
        let sessions: Vec<(i64, SessionHandle)> = self.sessions.lock().await.drain().collect();
        info!("Closing {} session(s)", sessions.len());
        for (chat_id, SessionHandle { tx, task, .. }) in sessions {
            drop(tx);
            if let Err(e) = task.await {
                error!("Session {} task failed: {}", chat_id, e);
            }
        }
    }

    fn spawn_session(&self, chat_id: i64) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel(SESSION_QUEUE);
        let service = self.service.clone();
        let sessions = self.sessions.clone();
        let idle_timeout = self.idle_timeout;

        let task = tokio::spawn(async move {
            let mut ctx = service.new_context(chat_id);
            info!("Session {} started", chat_id);
            loop {
                let event = match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(_) => {
                        // Dispatch sends under this lock, so an empty queue here stays empty.
                        let mut map = sessions.lock().await;
                        match rx.try_recv() {
                            Ok(event) => event,
                            Err(_) => {
                                if map.get(&chat_id).is_some_and(|h| h.id == id) {
                                    map.remove(&chat_id);
                                }
                                info!("Session {} idle, evicted", chat_id);
                                break;
                            }
                        }
                    }
                };
                debug!("Session {} handling {:?}", chat_id, event);
                service.handle(&mut ctx, event).await;
            }
            info!("Session {} closed", chat_id);
        });
        SessionHandle { id, tx, task }
    }
}
