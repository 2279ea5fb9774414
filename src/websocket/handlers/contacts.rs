use crate::error::ErrorCode;
use crate::websocket::message::{
    ContactRef, RemoveContactPayload, SearchUsersPayload, ServerEvent, UserRef,
};

use super::{HandlerContext, HandlerError, HandlerResult};

/// Create a pending request and notify the addressee on every device
pub(crate) async fn send_contact_request(
    ctx: &HandlerContext<'_>,
    payload: UserRef,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let contact = ctx
        .services
        .contacts
        .send_request(&user.id, &payload.user_id)
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(
                ErrorCode::ContactRequestFailed,
                "Failed to send contact request",
            )
        })?;

    let target_user = ctx.services.users.get_user(&payload.user_id).await?;

    ctx.to_user(
        &payload.user_id,
        ServerEvent::ContactRequestReceived {
            contact: contact.clone(),
            from_user: user,
        },
    );
    ctx.reply(ServerEvent::ContactRequestSent {
        contact,
        target_user,
    });
    Ok(())
}

pub(crate) async fn accept_contact_request(
    ctx: &HandlerContext<'_>,
    payload: ContactRef,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let contact = ctx
        .services
        .contacts
        .accept_request(&user.id, &payload.contact_id)
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(
                ErrorCode::ContactRequestFailed,
                "Failed to accept contact request",
            )
        })?;

    let requester = ctx.services.users.get_user(&contact.user_id).await?;

    ctx.to_user(
        &contact.user_id,
        ServerEvent::ContactRequestAccepted {
            contact_id: contact.id.clone(),
            contact_user: None,
            accepted_by: Some(user),
        },
    );
    ctx.reply(ServerEvent::ContactRequestAccepted {
        contact_id: contact.id,
        contact_user: requester,
        accepted_by: None,
    });
    Ok(())
}

pub(crate) async fn decline_contact_request(
    ctx: &HandlerContext<'_>,
    payload: ContactRef,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let contact = ctx
        .services
        .contacts
        .decline_request(&user.id, &payload.contact_id)
        .await?
        .ok_or_else(|| {
            HandlerError::rejected(
                ErrorCode::ContactRequestFailed,
                "Failed to decline contact request",
            )
        })?;

    ctx.reply(ServerEvent::ContactRequestDeclined {
        contact_id: contact.id,
    });
    Ok(())
}

pub(crate) async fn remove_contact(
    ctx: &HandlerContext<'_>,
    payload: RemoveContactPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if !ctx
        .services
        .contacts
        .remove_contact(&user.id, &payload.contact_user_id)
        .await?
    {
        return Err(HandlerError::rejected(
            ErrorCode::ContactRemovalFailed,
            "Failed to remove contact",
        ));
    }

    ctx.to_user(
        &payload.contact_user_id,
        ServerEvent::ContactRemoved {
            user_id: user.id.clone(),
        },
    );
    ctx.reply(ServerEvent::ContactRemoved {
        user_id: payload.contact_user_id,
    });
    Ok(())
}

pub(crate) async fn block_user(ctx: &HandlerContext<'_>, payload: UserRef) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if !ctx
        .services
        .contacts
        .block_user(&user.id, &payload.user_id)
        .await?
    {
        return Err(HandlerError::rejected(
            ErrorCode::BlockFailed,
            "Failed to block user",
        ));
    }

    ctx.reply(ServerEvent::UserBlocked {
        user_id: payload.user_id,
    });
    Ok(())
}

pub(crate) async fn unblock_user(ctx: &HandlerContext<'_>, payload: UserRef) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if !ctx
        .services
        .contacts
        .unblock_user(&user.id, &payload.user_id)
        .await?
    {
        return Err(HandlerError::rejected(
            ErrorCode::UnblockFailed,
            "Failed to unblock user",
        ));
    }

    ctx.reply(ServerEvent::UserUnblocked {
        user_id: payload.user_id,
    });
    Ok(())
}

pub(crate) async fn get_contacts(ctx: &HandlerContext<'_>) -> HandlerResult {
    let user = ctx.require_auth().await?;
    let contacts = ctx.services.contacts.contacts(&user.id).await?;

    ctx.reply(ServerEvent::ContactsList { contacts });
    Ok(())
}

pub(crate) async fn get_pending_requests(ctx: &HandlerContext<'_>) -> HandlerResult {
    let user = ctx.require_auth().await?;
    let pending = ctx.services.contacts.pending_requests(&user.id).await?;

    ctx.reply(ServerEvent::PendingRequests {
        incoming: pending.incoming,
        outgoing: pending.outgoing,
    });
    Ok(())
}

pub(crate) async fn get_blocked_users(ctx: &HandlerContext<'_>) -> HandlerResult {
    let user = ctx.require_auth().await?;
    let blocked_users = ctx.services.contacts.blocked_users(&user.id).await?;

    ctx.reply(ServerEvent::BlockedUsersList { blocked_users });
    Ok(())
}

pub(crate) async fn search_users(
    ctx: &HandlerContext<'_>,
    payload: SearchUsersPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    let limit = payload
        .limit
        .unwrap_or(ctx.limits.default_search_limit)
        .min(ctx.limits.max_search_limit)
        .max(1);
    let users = ctx
        .services
        .contacts
        .search_users(payload.query.trim(), &user.id, limit)
        .await?;

    ctx.reply(ServerEvent::UsersSearchResults {
        query: payload.query,
        users,
    });
    Ok(())
}
