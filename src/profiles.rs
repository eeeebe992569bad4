use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditDecision {
    Allowed,
    CoolingDown { next_allowed: DateTime<Utc> },
}

/// Profiles may be edited once per `cooldown`; admins are exempt.
pub fn check_edit_cooldown(
    last_edit: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Duration,
    is_admin: bool,
) -> EditDecision {
    if is_admin {
        return EditDecision::Allowed;
    }
    let Some(last) = last_edit else {
        return EditDecision::Allowed;
    };
    // A window past the representable range never ends.
    let next_allowed = last.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC);
    if now < next_allowed {
        EditDecision::CoolingDown { next_allowed }
    } else {
        EditDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_edit_is_always_allowed() {
        assert_eq!(
            check_edit_cooldown(None, Utc::now(), Duration::days(7), false),
            EditDecision::Allowed
        );
    }

    #[test]
    fn edits_inside_the_window_are_refused_unless_admin() {
        let last = Utc::now() - Duration::days(3);
        let now = Utc::now();
        assert_eq!(
            check_edit_cooldown(Some(last), now, Duration::days(7), false),
            EditDecision::CoolingDown { next_allowed: last + Duration::days(7) }
        );
        assert_eq!(
            check_edit_cooldown(Some(last), now, Duration::days(7), true),
            EditDecision::Allowed
        );
    }

    #[test]
    fn oversized_cooldown_saturates() {
        let last = Utc::now();
        assert_eq!(
            check_edit_cooldown(Some(last), last, Duration::MAX, false),
            EditDecision::CoolingDown { next_allowed: DateTime::<Utc>::MAX_UTC }
        );
    }

    #[test]
    fn window_ends_exactly_at_the_cooldown() {
        let last = Utc::now() - Duration::days(7);
        assert_eq!(
            check_edit_cooldown(Some(last), last + Duration::days(7), Duration::days(7), false),
            EditDecision::Allowed
        );
    }
}
