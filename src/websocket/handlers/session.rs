use tracing::info;

use crate::error::ErrorCode;
use crate::websocket::message::{AuthenticatePayload, ServerEvent, UpdateStatusPayload};

use super::{HandlerContext, HandlerError, HandlerResult};

pub(crate) async fn authenticate(
    ctx: &HandlerContext<'_>,
    payload: AuthenticatePayload,
) -> HandlerResult {
    if !ctx
        .connections
        .authenticate(ctx.connection_id, &payload.token)
        .await
    {
        return Err(HandlerError::rejected(
            ErrorCode::AuthenticationFailed,
            "Invalid token",
        ));
    }

    let user = ctx.require_auth().await?;
    ctx.reply(ServerEvent::AuthSuccess {
        user,
        connection_id: ctx.connection_id,
    });
    Ok(())
}

pub(crate) async fn logout(ctx: &HandlerContext<'_>) -> HandlerResult {
    let user = ctx.require_auth().await?;
    ctx.connections.deauthenticate(ctx.connection_id).await;

    info!(connection_id = %ctx.connection_id, user_id = %user.id, "User logged out");
    ctx.reply(ServerEvent::LogoutSuccess {});
    Ok(())
}

/// Explicit away/busy/online. The change goes to the user's own devices and to
/// their accepted contacts.
pub(crate) async fn update_status(
    ctx: &HandlerContext<'_>,
    payload: UpdateStatusPayload,
) -> HandlerResult {
    let user = ctx.require_auth().await?;

    if !ctx
        .connections
        .presence()
        .set_status(&user.id, payload.status)
        .await
    {
        return Err(HandlerError::rejected(ErrorCode::UserNotFound, "User not found"));
    }

    let event = ServerEvent::StatusUpdated {
        user_id: user.id.clone(),
        status: payload.status,
    };
    ctx.to_user(&user.id, event.clone());

    for contact in ctx.services.contacts.contacts(&user.id).await? {
        ctx.to_user(&contact.user.id, event.clone());
    }
    Ok(())
}
