use crate::events::{OrchestratorBus, OrchestratorEvent};
use crate::ids::{AgentId, SessionId};
use crate::mirror::{StoreMirror, MESSAGES_TABLE};
use crate::types::{AgentMessage, CollaborationSession, JsonMap, MessageKind, SessionStatus};
use chrono::Utc;
use conclave_core::{ConclaveError, ConclaveResult};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Sender id used for messages the orchestrator itself sends.
pub const SYSTEM_AGENT: &str = "system";

const SESSION_NAME_OBJECTIVE_CHARS: usize = 50;

/// Named sessions among agents. Sessions live in memory; only the messages
/// exchanged in them are persisted.
pub struct CollaborationManager {
    sessions: RwLock<HashMap<SessionId, CollaborationSession>>,
    events: OrchestratorBus,
    mirror: StoreMirror,
}

impl CollaborationManager {
    pub fn new(events: OrchestratorBus, mirror: StoreMirror) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            mirror,
        }
    }

    /// Open a session and send every participant one invitation.
    pub async fn start_collaboration(
        &self,
        objective: &str,
        participants: Vec<AgentId>,
    ) -> CollaborationSession {
        let prefix: String = objective.chars().take(SESSION_NAME_OBJECTIVE_CHARS).collect();
        let mut session = CollaborationSession {
            id: SessionId::new(),
            name: format!("Collaboration: {prefix}"),
            participants: participants.clone(),
            objective: objective.to_string(),
            status: SessionStatus::Active,
            messages: Vec::new(),
            shared_context: JsonMap::new(),
            created_at: Utc::now(),
        };
        info!(session_id = %session.id, participants = participants.len(), "collaboration started");

        for participant in participants {
            let invite = AgentMessage::new(
                AgentId::new(SYSTEM_AGENT),
                participant,
                MessageKind::Notification,
                json!({
                    "type": "collaboration_invite",
                    "sessionId": session.id,
                    "objective": objective,
                }),
            );
            session.messages.push(invite.clone());
            self.deliver(invite).await;
        }

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        self.events
            .publish(OrchestratorEvent::CollaborationStarted(session.clone()));
        session
    }

    /// Append a message to a session, persist it and announce it.
    pub async fn send_message(
        &self,
        session_id: SessionId,
        message: AgentMessage,
    ) -> ConclaveResult<()> {
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions.get_mut(&session_id).ok_or_else(|| {
                ConclaveError::Orchestrator(format!("Unknown collaboration session: {session_id}"))
            })?;
            session.messages.push(message.clone());
        }
        self.deliver(message).await;
        Ok(())
    }

    async fn deliver(&self, message: AgentMessage) {
        self.mirror.insert(MESSAGES_TABLE, &message).await;
        self.events.publish(OrchestratorEvent::MessageSent(message));
    }

    pub async fn get_session(&self, id: SessionId) -> Option<CollaborationSession> {
        self.sessions.read().await.get(&id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conclave_core::Event;
    use conclave_store::MemoryStore;
    use std::sync::Arc;

    fn manager() -> (CollaborationManager, Arc<MemoryStore>, OrchestratorBus) {
        let store = Arc::new(MemoryStore::new());
        let bus = OrchestratorBus::default();
        (
            CollaborationManager::new(bus.clone(), StoreMirror::new(store.clone())),
            store,
            bus,
        )
    }

    #[tokio::test]
    async fn test_session_name_truncates_objective() {
        let (manager, _store, _bus) = manager();
        let objective = "x".repeat(80);
        let session = manager.start_collaboration(&objective, Vec::new()).await;
        assert_eq!(session.name, format!("Collaboration: {}", "x".repeat(50)));
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_invites_each_participant() {
        let (manager, store, bus) = manager();
        let mut rx = bus.subscribe();
        let participants = vec![
            AgentId::new("sfdr-specialist"),
            AgentId::new("aml-analyst"),
            AgentId::new("validation-agent"),
        ];
        let session = manager
            .start_collaboration("Assess Fund X", participants)
            .await;

        assert_eq!(session.messages.len(), 3);
        for msg in &session.messages {
            assert_eq!(msg.kind, MessageKind::Notification);
            assert_eq!(msg.from.as_str(), SYSTEM_AGENT);
            assert_eq!(msg.content["type"], "collaboration_invite");
            assert_eq!(msg.content["sessionId"], session.id.to_string());
        }
        assert_eq!(store.log(MESSAGES_TABLE).await.len(), 3);

        let names: Vec<&str> = rx.drain().iter().map(Event::name).collect();
        assert_eq!(
            names,
            vec!["messageSent", "messageSent", "messageSent", "collaborationStarted"]
        );
    }

    #[tokio::test]
    async fn test_send_appends_to_session() {
        let (manager, _store, _bus) = manager();
        let session = manager
            .start_collaboration("KYC refresh", vec![AgentId::new("aml-analyst")])
            .await;
        let reply = AgentMessage::new(
            AgentId::new("aml-analyst"),
            AgentId::new(SYSTEM_AGENT),
            MessageKind::Response,
            json!({"accepted": true}),
        );
        manager.send_message(session.id, reply).await.unwrap();
        let stored = manager.get_session(session.id).await.unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[1].kind, MessageKind::Response);
    }

    #[tokio::test]
    async fn test_send_to_unknown_session() {
        let (manager, _store, _bus) = manager();
        let msg = AgentMessage::new(
            AgentId::new("a"),
            AgentId::new("b"),
            MessageKind::Request,
            json!({}),
        );
        assert!(manager.send_message(SessionId::new(), msg).await.is_err());
    }
}
