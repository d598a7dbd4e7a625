use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::{EventBus, TopicBroker};

use super::engine::FlowEngine;

/// 把 broker 上的入站消息转发给 `handle_message`
pub fn spawn_message_listener(engine: FlowEngine, broker: Arc<dyn TopicBroker>) -> JoinHandle<()> {
    let mut messages = broker.messages();
    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(message) => match engine.handle_message(&message.topic, message.payload).await {
                    Ok(resumed) => debug!(topic = %message.topic, resumed, "message dispatched"),
                    Err(err) => error!(topic = %message.topic, error = %err, "message dispatch failed"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "message listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("message listener stopped");
    })
}

/// 把事件总线上的事件转发给 `emit_event`
pub fn spawn_event_listener(engine: FlowEngine, bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(err) = engine.emit_event(&event.name, event.data).await {
                        error!(event = %event.name, error = %err, "event dispatch failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
        info!("event listener stopped");
    })
}

/// 周期性回收超时的等待节点
pub fn spawn_reaper(engine: FlowEngine, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            match engine.reap_all().await {
                Ok(0) => {}
                Ok(reaped) => info!(reaped, "expired waits reaped"),
                Err(err) => error!(error = %err, "reaper pass failed"),
            }
        }
    })
}
