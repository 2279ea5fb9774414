use crate::error::ErrorCode;
use crate::services::MessageWithAttachments;
use crate::websocket::message::{
    ConversationRef, EditMessagePayload, GetMessagesPayload, MarkAsReadPayload, MessageRef,
    SendMessagePayload, ServerEvent,
};

use super::{HandlerContext, HandlerError, HandlerResult};

/// Persist and fan out to the conversation. The sender's own connections are
/// skipped.
pub(crate) async fn send_message(
    ctx: &HandlerContext<'_>,
    payload: SendMessagePayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let message = ctx
        .services
        .chat
        .send_message(
            &user.id,
            &payload.conversation_id,
            &payload.content,
            payload.message_type,
            payload.reply_to_id.as_deref(),
        )
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(
                ErrorCode::PermissionDenied,
                "Cannot send message to this conversation",
            )
        })?;

    let attachments = ctx.services.files.message_attachments(&message.id).await?;
    let conversation_id = message.conversation_id.clone();

    ctx.to_room(
        &conversation_id,
        ServerEvent::NewMessage {
            message,
            sender: user.clone(),
            attachments,
        },
        Some(&user.id),
    );
    Ok(())
}

pub(crate) async fn edit_message(
    ctx: &HandlerContext<'_>,
    payload: EditMessagePayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if ctx
        .services
        .chat
        .get_message(&payload.message_id)
        .await?
        .is_none()
    {
        return Err(HandlerError::rejected(
            ErrorCode::MessageNotFound,
            "Message not found",
        ));
    }

    let message = ctx
        .services
        .chat
        .edit_message(&user.id, &payload.message_id, &payload.content)
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(ErrorCode::PermissionDenied, "Cannot edit this message")
        })?;

    ctx.to_room(
        &message.conversation_id,
        ServerEvent::MessageEdited {
            message_id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            content: message.content.clone(),
            edited_at: message.edited_at,
        },
        None,
    );
    Ok(())
}

pub(crate) async fn delete_message(ctx: &HandlerContext<'_>, payload: MessageRef) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if ctx
        .services
        .chat
        .get_message(&payload.message_id)
        .await?
        .is_none()
    {
        return Err(HandlerError::rejected(
            ErrorCode::MessageNotFound,
            "Message not found",
        ));
    }

    let message = ctx
        .services
        .chat
        .delete_message(&user.id, &payload.message_id)
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(ErrorCode::PermissionDenied, "Cannot delete this message")
        })?;

    ctx.to_room(
        &message.conversation_id,
        ServerEvent::MessageDeleted {
            message_id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            deleted_at: message.deleted_at,
        },
        None,
    );
    Ok(())
}

pub(crate) async fn mark_as_read(
    ctx: &HandlerContext<'_>,
    payload: MarkAsReadPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let marked = ctx
        .services
        .chat
        .mark_as_read(&user.id, &payload.conversation_id, &payload.message_id)
        .await?;
    if !marked {
        return Err(HandlerError::rejected(
            ErrorCode::PermissionDenied,
            "Cannot mark messages as read",
        ));
    }

    ctx.reply(ServerEvent::MessagesMarkedRead {
        conversation_id: payload.conversation_id,
        message_id: payload.message_id,
    });
    Ok(())
}

/// `typing_start` / `typing_stop`, relayed to the rest of the conversation
pub(crate) async fn typing(
    ctx: &HandlerContext<'_>,
    payload: ConversationRef,
    started: bool,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if !ctx
        .services
        .chat
        .is_participant(&payload.conversation_id, &user.id)
        .await?
    {
        return Err(HandlerError::rejected(
            ErrorCode::PermissionDenied,
            "Not a participant of this conversation",
        ));
    }

    let event = if started {
        ServerEvent::TypingStarted {
            conversation_id: payload.conversation_id.clone(),
            user_id: user.id.clone(),
            username: user.username.clone(),
        }
    } else {
        ServerEvent::TypingStopped {
            conversation_id: payload.conversation_id.clone(),
            user_id: user.id.clone(),
        }
    };
    ctx.to_room(&payload.conversation_id, event, Some(&user.id));
    Ok(())
}

pub(crate) async fn get_messages(
    ctx: &HandlerContext<'_>,
    payload: GetMessagesPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if !ctx
        .services
        .chat
        .is_participant(&payload.conversation_id, &user.id)
        .await?
    {
        return Err(HandlerError::rejected(
            ErrorCode::PermissionDenied,
            "Not a participant of this conversation",
        ));
    }

    let limit = payload
        .limit
        .unwrap_or(ctx.limits.default_history_limit)
        .min(ctx.limits.max_history_limit)
        .max(1);
    let offset = payload.offset.unwrap_or(0);

    let history = ctx
        .services
        .chat
        .conversation_messages(&payload.conversation_id, limit, offset)
        .await?;

    let mut messages = Vec::with_capacity(history.len());
    for message in history {
        let attachments = ctx.services.files.message_attachments(&message.id).await?;
        messages.push(MessageWithAttachments {
            message,
            attachments,
        });
    }

    ctx.reply(ServerEvent::MessagesList {
        conversation_id: payload.conversation_id,
        messages,
        limit,
        offset,
    });
    Ok(())
}
