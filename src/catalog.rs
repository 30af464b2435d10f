use crate::model::BadgeDefinition;

/// Static achievement table. Ids are stable wire values; titles are display
/// defaults the UI may localize on its side.
pub const CATALOG: &[BadgeDefinition] = &[
    BadgeDefinition { id: "high_flyer", title: "High Flyer", xp: 50 },
    BadgeDefinition { id: "flawless_victory", title: "Flawless Victory", xp: 100 },
    BadgeDefinition { id: "active_citizen", title: "Active Citizen", xp: 30 },
    BadgeDefinition { id: "team_player", title: "Team Player", xp: 30 },
    BadgeDefinition { id: "on_time_submitter", title: "On-Time Submitter", xp: 10 },
    BadgeDefinition { id: "early_bird", title: "Early Bird", xp: 40 },
    BadgeDefinition { id: "subject_master", title: "Subject Master", xp: 80 },
    BadgeDefinition { id: "comeback_king", title: "Comeback King", xp: 60 },
    BadgeDefinition { id: "marathon_runner", title: "Marathon Runner", xp: 60 },
    BadgeDefinition { id: "knowledge_hat_trick", title: "Knowledge Hat-Trick", xp: 70 },
    BadgeDefinition { id: "perfect_attendance_month", title: "Perfect Attendance Month", xp: 50 },
    BadgeDefinition { id: "iron_will", title: "Iron Will", xp: 100 },
    BadgeDefinition { id: "consistent_performer", title: "Consistent Performer", xp: 70 },
    BadgeDefinition { id: "homework_hero", title: "Homework Hero", xp: 40 },
    BadgeDefinition { id: "planner", title: "Planner", xp: 30 },
    BadgeDefinition { id: "explorer", title: "Explorer", xp: 20 },
    BadgeDefinition { id: "librarian", title: "Librarian", xp: 50 },
    BadgeDefinition { id: "fully_informed", title: "Fully Informed", xp: 30 },
];

pub fn find(badge_id: &str) -> Option<&'static BadgeDefinition> {
    CATALOG.iter().find(|d| d.id == badge_id)
}

/// A badge id with no catalog entry contributes 0 XP rather than failing the
/// ledger computation.
pub fn xp_for(badge_id: &str) -> i64 {
    find(badge_id).map(|d| d.xp).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<&str> = CATALOG.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn unknown_badge_is_worth_nothing() {
        assert_eq!(xp_for("no_such_badge"), 0);
        assert_eq!(xp_for("flawless_victory"), 100);
    }
}
