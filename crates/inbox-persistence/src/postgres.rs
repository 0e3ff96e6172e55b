use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inbox_types::dto::{ListConversationsQuery, ListMessagesQuery, Page};
use inbox_types::entities::{
    AgentSummary, Channel, ChannelStatus, Contact, Conversation, ConversationEvent,
    ConversationEventType, ConversationStatus, ConversationWithRelations, FailedJob, Message,
    MessageDirection, MessageStatus, Provider,
};
use inbox_types::payload::{InboundContent, OutboundContent};
use inbox_types::{AppError, AppResult};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{is_unique_violation, map_sqlx_err};
use crate::traits::{ConversationOutcome, Inserted, Persistence};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Stand-in for a conversation with no `last_message_at` when building the
/// keyset cursor, so list ordering (`last_message_at DESC NULLS LAST`) has
/// a concrete sort key to page against instead of special-casing NULL.
const NO_LAST_MESSAGE_SENTINEL: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

fn channel_status_from_str(s: &str) -> ChannelStatus {
    match s {
        "INACTIVE" => ChannelStatus::Inactive,
        "ERROR" => ChannelStatus::Error,
        _ => ChannelStatus::Active,
    }
}

fn provider_from_str(s: &str) -> Provider {
    s.parse().unwrap_or(Provider::A)
}

fn channel_from_row(row: &sqlx::postgres::PgRow) -> Channel {
    Channel {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        provider: provider_from_str(row.get::<String, _>("provider").as_str()),
        config: row.get("config"),
        webhook_secret: row.get("webhook_secret"),
        status: channel_status_from_str(row.get::<String, _>("status").as_str()),
    }
}

fn contact_from_row(row: &sqlx::postgres::PgRow) -> Contact {
    Contact {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        provider: provider_from_str(row.get::<String, _>("provider").as_str()),
        provider_id: row.get("provider_id"),
        display_name: row.get("display_name"),
        metadata: row.get("metadata"),
        last_seen_at: row.get("last_seen_at"),
    }
}

fn conversation_status_from_str(s: &str) -> ConversationStatus {
    match s {
        "ASSIGNED" => ConversationStatus::Assigned,
        "COMPLETED" => ConversationStatus::Completed,
        _ => ConversationStatus::Pending,
    }
}

fn conversation_from_row(row: &sqlx::postgres::PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        channel_id: row.get("channel_id"),
        contact_id: row.get("contact_id"),
        status: conversation_status_from_str(row.get::<String, _>("status").as_str()),
        assigned_agent_id: row.get("assigned_agent_id"),
        last_message_at: row.get("last_message_at"),
        first_response_at: row.get("first_response_at"),
        created_at: row.get("created_at"),
    }
}

fn message_status_from_str(s: &str) -> MessageStatus {
    match s {
        "SENT" => MessageStatus::Sent,
        "DELIVERED" => MessageStatus::Delivered,
        "READ" => MessageStatus::Read,
        "FAILED" => MessageStatus::Failed,
        _ => MessageStatus::Pending,
    }
}

fn message_direction_from_str(s: &str) -> MessageDirection {
    if s == "OUTBOUND" {
        MessageDirection::Outbound
    } else {
        MessageDirection::Inbound
    }
}

fn failed_job_from_row(row: &sqlx::postgres::PgRow) -> FailedJob {
    FailedJob {
        id: row.get("id"),
        queue: row.get("queue"),
        payload: row.get("payload"),
        error: row.get("error"),
        attempts: row.get("attempts"),
        failed_at: row.get("failed_at"),
    }
}

fn message_from_row(row: &sqlx::postgres::PgRow) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        direction: message_direction_from_str(row.get::<String, _>("direction").as_str()),
        agent_id: row.get("agent_id"),
        body: row.get("body"),
        media_ref: row.get("media_ref"),
        provider_message_id: row.get("provider_message_id"),
        status: message_status_from_str(row.get::<String, _>("status").as_str()),
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Persistence for PostgresStore {
    async fn get_channel(&self, channel_id: Uuid) -> AppResult<Channel> {
        let row = sqlx::query("SELECT * FROM channels WHERE id = $1")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| AppError::not_found(format!("channel {channel_id}")))?;
        Ok(channel_from_row(&row))
    }

    async fn get_channel_by_addressing_id(
        &self,
        provider: Provider,
        addressing_id: &str,
    ) -> AppResult<Channel> {
        let key = match provider {
            Provider::A => "phoneNumberId",
            Provider::B => "pageId",
        };
        let row = sqlx::query(
            "SELECT * FROM channels WHERE provider = $1 AND config ->> $2 = $3",
        )
        .bind(provider.as_str())
        .bind(key)
        .bind(addressing_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or_else(|| AppError::not_found(format!("channel for {addressing_id}")))?;
        Ok(channel_from_row(&row))
    }

    async fn upsert_contact(
        &self,
        organization_id: Uuid,
        provider: Provider,
        provider_id: &str,
        display_name: Option<&str>,
    ) -> AppResult<Contact> {
        let row = sqlx::query(
            r#"
            INSERT INTO contacts (organization_id, provider, provider_id, display_name, last_seen_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (organization_id, provider, provider_id)
            DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, contacts.display_name),
                last_seen_at = now()
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(provider.as_str())
        .bind(provider_id)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(contact_from_row(&row))
    }

    async fn find_or_create_conversation(
        &self,
        organization_id: Uuid,
        channel_id: Uuid,
        contact_id: Uuid,
    ) -> AppResult<(Conversation, ConversationOutcome)> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        if let Some(row) = sqlx::query(
            "SELECT * FROM conversations WHERE contact_id = $1 AND status <> 'COMPLETED'",
        )
        .bind(contact_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        {
            tx.commit().await.map_err(map_sqlx_err)?;
            return Ok((conversation_from_row(&row), ConversationOutcome::Existing));
        }

        // No open conversation: either this contact is brand new, or its
        // last conversation was completed and this message reopens it.
        let reopened = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'PENDING', last_message_at = now()
            WHERE contact_id = $1 AND status = 'COMPLETED'
            RETURNING *
            "#,
        )
        .bind(contact_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let (row, outcome) = if let Some(row) = reopened {
            (row, ConversationOutcome::Reopened)
        } else {
            let row = sqlx::query(
                r#"
                INSERT INTO conversations (organization_id, channel_id, contact_id, status, last_message_at)
                VALUES ($1, $2, $3, 'PENDING', now())
                RETURNING *
                "#,
            )
            .bind(organization_id)
            .bind(channel_id)
            .bind(contact_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
            (row, ConversationOutcome::Created)
        };

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok((conversation_from_row(&row), outcome))
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<ConversationWithRelations> {
        let conv_row = sqlx::query("SELECT * FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| AppError::not_found(format!("conversation {conversation_id}")))?;
        let conversation = conversation_from_row(&conv_row);

        let contact_row = sqlx::query("SELECT * FROM contacts WHERE id = $1")
            .bind(conversation.contact_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        let channel_row = sqlx::query("SELECT * FROM channels WHERE id = $1")
            .bind(conversation.channel_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(ConversationWithRelations {
            assigned_agent: conversation.assigned_agent_id.map(|id| AgentSummary {
                id,
                display_name: id.to_string(),
            }),
            conversation,
            contact: contact_from_row(&contact_row),
            channel: channel_from_row(&channel_row),
        })
    }

    async fn list_conversations(
        &self,
        organization_id: Uuid,
        query: &ListConversationsQuery,
    ) -> AppResult<Page<ConversationWithRelations>> {
        let limit = query.effective_limit() as i64;

        // Keyset cursor on (last_message_at, created_at), both DESC, matching
        // the list ordering below. `last_message_at` is coalesced to a fixed
        // sentinel on both sides of the comparison so NULLS LAST has a
        // concrete sort key to page against.
        let cursor = query.cursor.as_deref().and_then(|c| c.split_once('|'));
        let cursor_sort_ts = cursor.and_then(|(a, _)| a.parse::<DateTime<Utc>>().ok());
        let cursor_created_at = cursor.and_then(|(_, b)| b.parse::<DateTime<Utc>>().ok());

        let status_filter = query.status.map(|s| match s {
            ConversationStatus::Pending => "PENDING",
            ConversationStatus::Assigned => "ASSIGNED",
            ConversationStatus::Completed => "COMPLETED",
        });

        // Fetch one extra row to know whether another page follows,
        // rather than issuing a separate COUNT query.
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM conversations c
            JOIN contacts ct ON ct.id = c.contact_id
            WHERE c.organization_id = $1
              AND ($2::text IS NULL OR c.status = $2)
              AND ($3::uuid IS NULL OR c.assigned_agent_id = $3)
              AND ($4::uuid IS NULL OR c.channel_id = $4)
              AND ($5::text IS NULL OR ct.display_name ILIKE '%' || $5 || '%' OR ct.provider_id ILIKE '%' || $5 || '%')
              AND (
                $6::timestamptz IS NULL
                OR (COALESCE(c.last_message_at, $8), c.created_at) < ($6, $7)
              )
            ORDER BY COALESCE(c.last_message_at, $8) DESC, c.created_at DESC
            LIMIT $9
            "#,
        )
        .bind(organization_id)
        .bind(status_filter)
        .bind(query.assigned_agent_id)
        .bind(query.channel_id)
        .bind(query.search.as_deref())
        .bind(cursor_sort_ts)
        .bind(cursor_created_at)
        .bind(NO_LAST_MESSAGE_SENTINEL)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let has_more = rows.len() as i64 > limit;
        let mut conversations: Vec<Conversation> = rows.iter().map(conversation_from_row).collect();
        conversations.truncate(limit as usize);

        let next_cursor = if has_more {
            conversations.last().map(|c| {
                let sort_ts = c.last_message_at.unwrap_or(NO_LAST_MESSAGE_SENTINEL);
                format!("{}|{}", sort_ts.to_rfc3339(), c.created_at.to_rfc3339())
            })
        } else {
            None
        };

        let mut items = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let contact_row = sqlx::query("SELECT * FROM contacts WHERE id = $1")
                .bind(conversation.contact_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            let channel_row = sqlx::query("SELECT * FROM channels WHERE id = $1")
                .bind(conversation.channel_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            items.push(ConversationWithRelations {
                assigned_agent: conversation.assigned_agent_id.map(|id| AgentSummary {
                    id,
                    display_name: id.to_string(),
                }),
                conversation,
                contact: contact_from_row(&contact_row),
                channel: channel_from_row(&channel_row),
            });
        }

        Ok(Page { items, next_cursor })
    }

    async fn accept_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation> {
        let row = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'ASSIGNED', assigned_agent_id = $2
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            Some(row) => Ok(conversation_from_row(&row)),
            None => Err(AppError::conflict(
                "conversation is already assigned or completed",
            )),
        }
    }

    async fn release_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation> {
        let row = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'PENDING', assigned_agent_id = NULL
            WHERE id = $1 AND status = 'ASSIGNED' AND assigned_agent_id = $2
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            Some(row) => Ok(conversation_from_row(&row)),
            None => Err(AppError::conflict("conversation is not owned by this agent")),
        }
    }

    async fn complete_conversation(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
    ) -> AppResult<Conversation> {
        let row = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'COMPLETED', assigned_agent_id = NULL
            WHERE id = $1 AND status = 'ASSIGNED' AND assigned_agent_id = $2
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            Some(row) => Ok(conversation_from_row(&row)),
            None => Err(AppError::conflict("conversation is not owned by this agent")),
        }
    }

    async fn release_all_for_agent(&self, agent_id: Uuid) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'PENDING', assigned_agent_id = NULL
            WHERE status = 'ASSIGNED' AND assigned_agent_id = $1
            RETURNING *
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn insert_inbound_message(
        &self,
        conversation_id: Uuid,
        content: &InboundContent,
        provider_message_id: Option<&str>,
    ) -> AppResult<Inserted<Message>> {
        let content_json = serde_json::to_value(content).map_err(|e| AppError::Fatal(e.into()))?;
        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (conversation_id, direction, body, media_ref, content, provider_message_id, status)
            VALUES ($1, 'INBOUND', $2, $3, $4, $5, 'DELIVERED')
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(content.preview())
        .bind(content.media_ref())
        .bind(&content_json)
        .bind(provider_message_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                sqlx::query(
                    "UPDATE conversations SET last_message_at = now() WHERE id = $1",
                )
                .bind(conversation_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
                Ok(Inserted {
                    value: message_from_row(&row),
                    was_new: true,
                })
            }
            Err(err) if is_unique_violation(&err) => {
                let provider_message_id = provider_message_id
                    .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("unique violation without id")))?;
                let existing = self
                    .find_message_by_provider_id(conversation_id, provider_message_id)
                    .await?
                    .ok_or_else(|| AppError::Fatal(anyhow::anyhow!("message vanished after conflict")))?;
                Ok(Inserted {
                    value: existing,
                    was_new: false,
                })
            }
            Err(err) => Err(map_sqlx_err(err)),
        }
    }

    async fn insert_outbound_message(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
        content: &OutboundContent,
    ) -> AppResult<Message> {
        let content_json = serde_json::to_value(content).map_err(|e| AppError::Fatal(e.into()))?;
        let body = match content {
            OutboundContent::Text { body } => Some(body.clone()),
            _ => None,
        };
        let media_ref = match content {
            OutboundContent::Image { url, .. } | OutboundContent::Document { url, .. } => {
                Some(url.clone())
            }
            OutboundContent::Text { .. } => None,
        };

        let row = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, direction, agent_id, body, media_ref, content, status)
            VALUES ($1, 'OUTBOUND', $2, $3, $4, $5, 'PENDING')
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(agent_id)
        .bind(body)
        .bind(media_ref)
        .bind(&content_json)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_at = now(),
                first_response_at = COALESCE(first_response_at, now())
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(message_from_row(&row))
    }

    async fn update_message_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> AppResult<Message> {
        let current = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| AppError::not_found(format!("message {message_id}")))?;
        let current = message_from_row(&current);

        if !current.status.can_advance_to(status) {
            return Err(AppError::conflict(format!(
                "cannot move message from {:?} to {:?}",
                current.status, status
            )));
        }

        let status_str = match status {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Read => "READ",
            MessageStatus::Failed => "FAILED",
        };

        let row = sqlx::query(
            r#"
            UPDATE messages
            SET status = $2, error_code = $3, error_message = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(status_str)
        .bind(error_code)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(message_from_row(&row))
    }

    async fn find_message_by_provider_id(
        &self,
        conversation_id: Uuid,
        provider_message_id: &str,
    ) -> AppResult<Option<Message>> {
        let row = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = $1 AND provider_message_id = $2",
        )
        .bind(conversation_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &ListMessagesQuery,
    ) -> AppResult<Page<Message>> {
        let limit = query.effective_limit() as i64;
        let cursor_created_at = query
            .cursor
            .as_deref()
            .and_then(|c| c.parse::<chrono::DateTime<Utc>>().ok());

        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1
              AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(conversation_id)
        .bind(cursor_created_at)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let has_more = rows.len() as i64 > limit;
        let mut items: Vec<Message> = rows.iter().map(message_from_row).collect();
        items.truncate(limit as usize);
        let next_cursor = if has_more {
            items.last().map(|m| m.created_at.to_rfc3339())
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    async fn append_event(
        &self,
        conversation_id: Uuid,
        event_type: ConversationEventType,
        actor_id: Option<Uuid>,
        metadata: Value,
    ) -> AppResult<ConversationEvent> {
        let type_str = serde_json::to_value(event_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let row = sqlx::query(
            r#"
            INSERT INTO conversation_events (conversation_id, event_type, actor_id, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(&type_str)
        .bind(actor_id)
        .bind(&metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ConversationEvent {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            event_type,
            actor_id: row.get("actor_id"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
        })
    }

    async fn record_failed_job(&self, queue: &str, payload: Value, error: &str, attempts: i32) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO failed_jobs (queue, payload, error, attempts) VALUES ($1, $2, $3, $4)",
        )
        .bind(queue)
        .bind(payload)
        .bind(error)
        .bind(attempts)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list_failed_jobs(&self, queue: Option<&str>) -> AppResult<Vec<FailedJob>> {
        let rows = sqlx::query(
            "SELECT * FROM failed_jobs WHERE ($1::text IS NULL OR queue = $1) ORDER BY failed_at DESC",
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.iter().map(failed_job_from_row).collect())
    }

    async fn requeue_failed_job(&self, id: Uuid) -> AppResult<FailedJob> {
        let row = sqlx::query("DELETE FROM failed_jobs WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| AppError::not_found(format!("failed job {id}")))?;
        Ok(failed_job_from_row(&row))
    }
}
