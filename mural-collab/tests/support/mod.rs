//! Minimal WebSocket relay: binary frames are fanned out to every other
//! connection on the same path.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

type Rooms = Arc<Mutex<HashMap<String, broadcast::Sender<(u64, Vec<u8>)>>>>;

pub struct Relay {
    pub url: String,
    handle: JoinHandle<()>,
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start_relay() -> Relay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let rooms: Rooms = Arc::default();
    let ids = Arc::new(AtomicU64::new(0));

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let id = ids.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(serve(stream, id, rooms.clone()));
        }
    });
    Relay { url, handle }
}

async fn serve(stream: TcpStream, id: u64, rooms: Rooms) {
    let mut path = String::new();
    let ws = match tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        Ok(resp)
    })
    .await
    {
        Ok(ws) => ws,
        Err(_) => return,
    };

    let room = rooms
        .lock()
        .unwrap()
        .entry(path)
        .or_insert_with(|| broadcast::channel(256).0)
        .clone();
    let mut frames = room.subscribe();
    let (mut writer, mut reader) = ws.split();

    loop {
        tokio::select! {
            msg = reader.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    let _ = room.send((id, data.to_vec()));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            frame = frames.recv() => match frame {
                Ok((from, data)) if from != id => {
                    if writer.send(Message::Binary(data.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
