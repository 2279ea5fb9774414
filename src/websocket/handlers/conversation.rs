use crate::error::ErrorCode;
use crate::services::Conversation;
use crate::websocket::message::{
    AddParticipantsPayload, ConversationRef, CreateGroupPayload, RemoveParticipantPayload,
    ServerEvent, UserRef,
};

use super::{HandlerContext, HandlerError, HandlerResult};

async fn existing_conversation(
    ctx: &HandlerContext<'_>,
    conversation_id: &str,
) -> HandlerResult<Conversation> {
    ctx.services
        .chat
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(ErrorCode::ConversationNotFound, "Conversation not found")
        })
}

/// Subscribe this connection to a conversation the user participates in
pub(crate) async fn join_conversation(
    ctx: &HandlerContext<'_>,
    payload: ConversationRef,
) -> HandlerResult {
    let user = ctx.require_auth().await?;
    existing_conversation(ctx, &payload.conversation_id).await?;

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

    if !ctx
        .connections
        .subscribe(ctx.connection_id, &payload.conversation_id)
    {
        return Err(HandlerError::rejected(
            ErrorCode::ServerError,
            "Failed to join conversation",
        ));
    }

    ctx.reply(ServerEvent::ConversationJoined {
        conversation_id: payload.conversation_id,
    });
    Ok(())
}

pub(crate) async fn leave_conversation(
    ctx: &HandlerContext<'_>,
    payload: ConversationRef,
) -> HandlerResult {
    ctx.require_auth().await?;

    if !ctx
        .connections
        .unsubscribe(ctx.connection_id, &payload.conversation_id)
    {
        return Err(HandlerError::rejected(
            ErrorCode::ServerError,
            "Failed to leave conversation",
        ));
    }

    ctx.reply(ServerEvent::ConversationLeft {
        conversation_id: payload.conversation_id,
    });
    Ok(())
}

/// Create a group owned by the requester and invite the other participants
pub(crate) async fn create_group(
    ctx: &HandlerContext<'_>,
    payload: CreateGroupPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let conversation = ctx
        .services
        .chat
        .create_group(
            &user.id,
            &payload.name,
            payload.description.as_deref(),
            &payload.participant_ids,
        )
        .await?
        .ok_or_else(|| HandlerError::rejected(ErrorCode::ServerError, "Failed to create group"))?;

    let participants = ctx.services.chat.participants(&conversation.id).await?;

    for participant in participants.iter().filter(|p| p.user.id != user.id) {
        ctx.to_user(
            &participant.user.id,
            ServerEvent::GroupInvitation {
                conversation: conversation.clone(),
                invited_by: user.clone(),
            },
        );
    }

    ctx.reply(ServerEvent::GroupCreated {
        conversation,
        participants,
    });
    Ok(())
}

pub(crate) async fn create_direct_chat(ctx: &HandlerContext<'_>, payload: UserRef) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let other_user = ctx
        .services
        .users
        .get_user(&payload.user_id)
        .await?
        .ok_or_else(|| HandlerError::rejected(ErrorCode::UserNotFound, "User not found"))?;

    let conversation = ctx
        .services
        .chat
        .create_direct(&user.id, &other_user.id)
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(ErrorCode::ServerError, "Failed to create direct chat")
        })?;

    ctx.reply(ServerEvent::DirectChatCreated {
        conversation,
        other_user: Some(other_user),
    });
    Ok(())
}

pub(crate) async fn add_participants(
    ctx: &HandlerContext<'_>,
    payload: AddParticipantsPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;
    let conversation = existing_conversation(ctx, &payload.conversation_id).await?;

    let mut added = Vec::new();
    for user_id in &payload.user_ids {
        if ctx
            .services
            .chat
            .add_participant(&user.id, &conversation.id, user_id)
            .await?
        {
            added.push(user_id.clone());
        }
    }

    if added.is_empty() {
        return Err(HandlerError::rejected(
            ErrorCode::PermissionDenied,
            "Cannot add participants to this conversation",
        ));
    }

    for user_id in &added {
        ctx.to_user(
            user_id,
            ServerEvent::GroupInvitation {
                conversation: conversation.clone(),
                invited_by: user.clone(),
            },
        );
    }

    let event = ServerEvent::ParticipantsAdded {
        conversation_id: conversation.id.clone(),
        user_ids: added,
        added_by: user.id.clone(),
    };
    ctx.to_room(&conversation.id, event.clone(), Some(&user.id));
    ctx.reply(event);
    Ok(())
}

/// Remove a participant (or leave, when the target is the requester). The removed
/// user's connections stop receiving the conversation immediately.
pub(crate) async fn remove_participant(
    ctx: &HandlerContext<'_>,
    payload: RemoveParticipantPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;
    let conversation = existing_conversation(ctx, &payload.conversation_id).await?;

    if !ctx
        .services
        .chat
        .remove_participant(&user.id, &conversation.id, &payload.user_id)
        .await?
    {
        return Err(HandlerError::rejected(
            ErrorCode::PermissionDenied,
            "Cannot remove this participant",
        ));
    }

    ctx.connections
        .unsubscribe_user(&payload.user_id, &conversation.id);

    if payload.user_id != user.id {
        ctx.to_user(
            &payload.user_id,
            ServerEvent::RemovedFromConversation {
                conversation_id: conversation.id.clone(),
                removed_by: user.id.clone(),
            },
        );
    }

    let event = ServerEvent::ParticipantRemoved {
        conversation_id: conversation.id.clone(),
        user_id: payload.user_id,
        removed_by: user.id.clone(),
    };
    ctx.to_room(&conversation.id, event.clone(), Some(&user.id));
    ctx.reply(event);
    Ok(())
}

pub(crate) async fn get_conversations(ctx: &HandlerContext<'_>) -> HandlerResult {
    let user = ctx.require_auth().await?;
    let conversations = ctx.services.chat.user_conversations(&user.id).await?;

    ctx.reply(ServerEvent::ConversationsList { conversations });
    Ok(())
}

pub(crate) async fn get_participants(
    ctx: &HandlerContext<'_>,
    payload: ConversationRef,
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

    let participants = ctx
        .services
        .chat
        .participants(&payload.conversation_id)
        .await?;
    ctx.reply(ServerEvent::ParticipantsList {
        conversation_id: payload.conversation_id,
        participants,
    });
    Ok(())
}
