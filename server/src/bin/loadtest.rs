//! Load test for the typetype server.
//!
//! Spawns pairs of fake WebSocket clients. In each pair:
//! - the host creates a room, the guest joins it with the room code
//! - the host starts a match as soon as the guest arrives
//! - both type their target words with a simulated per-character delay,
//!   occasionally mistyping
//! - the host asks for a rematch after every finished match
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --pairs N         Number of duelling pairs (default: 50)
//!   --duration S      Test duration in seconds (default: 30)
//!   --char-ms MS      Typing delay per character (default: 90)
//!   --error-rate P    Probability of mistyping a word (default: 0.05)
//!   --url URL         Server URL (default: ws://127.0.0.1:3001/ws)

use futures_util::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use typetype_shared::protocol::{
    ClientMsg, CreateRoomMsg, GameSnapshot, JoinRoomMsg, ServerMsg, WordSubmittedMsg,
};
use typetype_shared::round::MatchStatus;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    rooms_created: AtomicU64,
    matches_started: AtomicU64,
    matches_finished: AtomicU64,
    words_submitted: AtomicU64,
    updates_received: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

#[derive(Clone, Copy)]
struct Options {
    duration: Duration,
    char_ms: u64,
    error_rate: f64,
}

enum Role {
    Host { code_tx: oneshot::Sender<String> },
    Guest { code_rx: oneshot::Receiver<String> },
}

/// A word being "typed", submitted once `at` passes
struct PendingWord {
    at: Instant,
    word: String,
    time_taken: u64,
}

async fn send_msg(ws: &mut WsStream, msg: &ClientMsg) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => ws.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Wait for `room_joined` and return (room code, side).
async fn await_room_joined(ws: &mut WsStream) -> Option<(String, u8)> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMsg>(&text) {
                Ok(ServerMsg::RoomJoined(joined)) => return Some((joined.room_code, joined.side)),
                Ok(ServerMsg::Error(e)) => {
                    eprintln!("Server refused room: {}", e.message);
                    return None;
                }
                _ => {}
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
    None
}

struct Typist {
    side: u8,
    answered_word_at: Option<u64>,
    pending: Option<PendingWord>,
    rng: ChaCha8Rng,
    options: Options,
}

impl Typist {
    /// Schedule a submission if the snapshot puts this side on turn with a fresh word.
    fn observe(&mut self, snapshot: &GameSnapshot) {
        if snapshot.game_status != MatchStatus::Playing
            || snapshot.current_player != self.side
            || snapshot.ball_moving_to_wall
            || self.answered_word_at == Some(snapshot.word_started_at)
        {
            return;
        }
        self.answered_word_at = Some(snapshot.word_started_at);

        let chars = snapshot.target_word.chars().count() as u64;
        let jitter = self.rng.gen_range(0..=self.options.char_ms);
        let time_taken = chars * self.options.char_ms + jitter;
        let word = if self.rng.gen_bool(self.options.error_rate) {
            format!("{}q", snapshot.target_word)
        } else {
            snapshot.target_word.clone()
        };
        self.pending = Some(PendingWord {
            at: Instant::now() + Duration::from_millis(time_taken),
            word,
            time_taken,
        });
    }
}

// === Client task ===

async fn run_client(client_id: u32, role: Role, url: String, options: Options, metrics: Arc<Metrics>) {
    let connect_start = Instant::now();
    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    metrics
        .latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let player_name = format!("bot{}", client_id);
    let is_host = matches!(role, Role::Host { .. });

    // Enter the room
    let side = match role {
        Role::Host { code_tx } => {
            let create = ClientMsg::CreateRoom(CreateRoomMsg { player_name });
            if !send_msg(&mut ws, &create).await {
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
            match await_room_joined(&mut ws).await {
                Some((code, side)) => {
                    metrics.rooms_created.fetch_add(1, Ordering::Relaxed);
                    let _ = code_tx.send(code);
                    side
                }
                None => {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
        Role::Guest { code_rx } => {
            let Ok(room_code) = code_rx.await else {
                // Host never got a room
                return;
            };
            let join = ClientMsg::JoinRoom(JoinRoomMsg {
                room_code,
                player_name,
            });
            if !send_msg(&mut ws, &join).await {
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
            match await_room_joined(&mut ws).await {
                Some((_, side)) => side,
                None => {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
    };

    let mut typist = Typist {
        side,
        answered_word_at: None,
        pending: None,
        rng: ChaCha8Rng::seed_from_u64(client_id as u64 * 12345 + 67890),
        options,
    };
    let mut rematch_at: Option<Instant> = None;
    let test_end = Instant::now() + options.duration;

    loop {
        let typing_deadline = typist.pending.as_ref().map(|p| p.at);

        tokio::select! {
            _ = tokio::time::sleep_until(test_end) => break,

            _ = wait_until(typing_deadline) => {
                if let Some(pending) = typist.pending.take() {
                    let msg = ClientMsg::WordSubmitted(WordSubmittedMsg {
                        word: pending.word,
                        time_taken: pending.time_taken,
                    });
                    if !send_msg(&mut ws, &msg).await {
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    metrics.words_submitted.fetch_add(1, Ordering::Relaxed);
                }
            }

            _ = wait_until(rematch_at) => {
                rematch_at = None;
                if !send_msg(&mut ws, &ClientMsg::StartGame).await {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(server_msg) = serde_json::from_str::<ServerMsg>(&text) else {
                            metrics.errors.fetch_add(1, Ordering::Relaxed);
                            continue;
                        };
                        match server_msg {
                            ServerMsg::PlayerJoined(_) if is_host => {
                                rematch_at = Some(Instant::now());
                            }
                            ServerMsg::GameStart(snapshot) => {
                                if is_host {
                                    metrics.matches_started.fetch_add(1, Ordering::Relaxed);
                                }
                                typist.pending = None;
                                typist.observe(&snapshot);
                            }
                            ServerMsg::GameStateUpdate(update) => {
                                metrics.updates_received.fetch_add(1, Ordering::Relaxed);
                                let finished = update.snapshot.game_status == MatchStatus::Lost;
                                if finished {
                                    typist.pending = None;
                                    if is_host && rematch_at.is_none() {
                                        metrics.matches_finished.fetch_add(1, Ordering::Relaxed);
                                        rematch_at = Some(Instant::now() + Duration::from_secs(1));
                                    }
                                } else {
                                    typist.observe(&update.snapshot);
                                }
                            }
                            ServerMsg::PlayerDisconnected(_) => break,
                            ServerMsg::Error(e) => {
                                if client_id < 5 {
                                    eprintln!("Client {} got error: {}", client_id, e.message);
                                }
                                metrics.errors.fetch_add(1, Ordering::Relaxed);
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 5 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_pairs: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut char_ms: u64 = 90;
    let mut error_rate: f64 = 0.05;
    let mut url = "ws://127.0.0.1:3001/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--pairs" => {
                i += 1;
                num_pairs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--char-ms" => {
                i += 1;
                char_ms = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(90);
            }
            "--error-rate" => {
                i += 1;
                error_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(0.05);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }
    let error_rate = error_rate.clamp(0.0, 1.0);

    println!("=== Typetype Server Load Test ===");
    println!("Pairs: {}", num_pairs);
    println!("Duration: {}s", duration_secs);
    println!("Typing: {}ms/char, {:.0}% mistyped", char_ms, error_rate * 100.0);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let options = Options {
        duration: Duration::from_secs(duration_secs),
        char_ms,
        error_rate,
    };

    let mut handles = Vec::with_capacity(num_pairs as usize * 2);
    println!("Spawning {} pairs...", num_pairs);
    let spawn_start = Instant::now();

    for pair in 0..num_pairs {
        let (code_tx, code_rx) = oneshot::channel();
        for (client_id, role) in [
            (pair * 2, Role::Host { code_tx }),
            (pair * 2 + 1, Role::Guest { code_rx }),
        ] {
            let url = url.clone();
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                run_client(client_id, role, url, options, metrics).await;
            }));
        }

        // Stagger spawns slightly to avoid thundering herd
        if pair % 25 == 24 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All pairs spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }
            println!(
                "[{:3}s] connected={}, rooms={}, matches={}/{}, words={}, updates={}, errors={}",
                elapsed,
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.rooms_created.load(Ordering::Relaxed),
                metrics_clone.matches_finished.load(Ordering::Relaxed),
                metrics_clone.matches_started.load(Ordering::Relaxed),
                metrics_clone.words_submitted.load(Ordering::Relaxed),
                metrics_clone.updates_received.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    // Wait for all clients to finish
    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    // Final stats
    let updates = metrics.updates_received.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!();
    println!("=== Final Results ===");
    println!("Rooms created: {}", metrics.rooms_created.load(Ordering::Relaxed));
    println!("Matches started: {}", metrics.matches_started.load(Ordering::Relaxed));
    println!("Matches finished: {}", metrics.matches_finished.load(Ordering::Relaxed));
    println!("Words submitted: {}", metrics.words_submitted.load(Ordering::Relaxed));
    println!("State updates received: {}", updates);
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));
    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    let clients = num_pairs as f64 * 2.0;
    if clients > 0.0 && duration_secs > 0 {
        println!(
            "Updates per client per second: {:.1}",
            updates as f64 / clients / duration_secs as f64
        );
    }
}
