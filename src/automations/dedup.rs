use chrono::{DateTime, FixedOffset, Utc};
use sqlx::AnyPool;

use crate::automations::clock::{local_date, parse_timestamp, start_of_day, timestamp};
use crate::db::queries;
use crate::error::AppResult;

/// True iff `last_fired_at` falls on the same business-local date as `now`.
///
/// An unparseable stored value counts as "never fired".
pub fn already_fired_today(last_fired_at: Option<&str>, now: DateTime<Utc>, tz: FixedOffset) -> bool {
    last_fired_at
        .and_then(parse_timestamp)
        .is_some_and(|last| local_date(last, tz) == local_date(now, tz))
}

/// Whether this automation already notified about `entity_id` today.
pub async fn entity_fired_today(
    pool: &AnyPool,
    automation_id: &str,
    entity_id: &str,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> AppResult<bool> {
    let since = timestamp(start_of_day(local_date(now, tz), tz));
    queries::automation_fired_for_entity_since(pool, automation_id, entity_id, &since).await
}
