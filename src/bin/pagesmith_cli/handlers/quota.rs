use pagesmith_api_types::{QuotaStatus, QuotaSyncRequest};

use crate::client::{CliError, Ctx};
use crate::print::print_json;
use crate::session::{QuotaReplica, Session};

pub async fn show(ctx: &Ctx, session: &mut Session) -> Result<(), CliError> {
    let status: QuotaStatus = ctx.get_json("api/v1/quota", session).await?;
    session.quota = Some(QuotaReplica::from_status(&status));
    print_json(&status)
}

async fn sync(
    ctx: &Ctx,
    session: &mut Session,
    previous: QuotaSyncRequest,
) -> Result<(), CliError> {
    let status: QuotaStatus = ctx
        .post_json("api/v1/quota/sync", session, &previous)
        .await?;
    session.quota = Some(QuotaReplica::from_status(&status));
    print_json(&status)
}

pub async fn sign_in(ctx: &Ctx, session: &mut Session, user: String) -> Result<(), CliError> {
    let user = user.trim().to_string();
    if user.is_empty() {
        return Err(CliError::InvalidInput("user must not be empty".into()));
    }
    let previous = QuotaSyncRequest {
        previous_client_id: session.user.is_none().then(|| session.client_id.clone()),
        previous_user: session.user.clone(),
    };
    session.user = Some(user);
    sync(ctx, session, previous).await
}

pub async fn sign_out(ctx: &Ctx, session: &mut Session) -> Result<(), CliError> {
    let Some(user) = session.user.take() else {
        return Err(CliError::InvalidInput("not signed in".into()));
    };
    let previous = QuotaSyncRequest {
        previous_client_id: None,
        previous_user: Some(user),
    };
    sync(ctx, session, previous).await
}
