//! Rotation policy evaluation
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::registry::RotationSchedule;
use chrono::{DateTime, Datelike, Duration, Utc};

/// Minimum key age before a daily rotation is due
const DAILY_MIN_AGE_HOURS: i64 = 24;

/// Minimum key age before a weekly rotation is due
const WEEKLY_MIN_AGE_DAYS: i64 = 7;

/// Whether the schedule makes a rotation due at `now` for a key whose age
/// is anchored at `anchor`
///
/// Daily and weekly policies are evaluated independently; either one being
/// due is sufficient.
pub fn is_rotation_due(
    schedule: &RotationSchedule,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    daily_due(schedule, anchor, now) || weekly_due(schedule, anchor, now)
}

fn daily_due(schedule: &RotationSchedule, anchor: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let daily = &schedule.daily;
    if !daily.enabled {
        return false;
    }
    now - anchor >= Duration::hours(DAILY_MIN_AGE_HOURS) && now.time() >= daily.time
}

fn weekly_due(schedule: &RotationSchedule, anchor: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let weekly = &schedule.weekly;
    if !weekly.enabled {
        return false;
    }
    now - anchor >= Duration::days(WEEKLY_MIN_AGE_DAYS)
        && now.weekday() == weekly.day
        && now.time() >= weekly.time
}

/// First configured emergency trigger matched by `signals`, scanning the
/// input left to right
pub fn first_matching_trigger<'a>(
    schedule: &RotationSchedule,
    signals: &'a [String],
) -> Option<&'a str> {
    if !schedule.emergency.enabled {
        return None;
    }
    signals
        .iter()
        .map(String::as_str)
        .find(|signal| schedule.emergency.triggers.iter().any(|t| t == signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DailyRotation, EmergencyRotation, WeeklyRotation};
    use chrono::{NaiveTime, TimeZone, Weekday};

    fn daily_schedule(time: &str) -> RotationSchedule {
        RotationSchedule {
            daily: DailyRotation {
                enabled: true,
                time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            },
            ..RotationSchedule::default()
        }
    }

    fn weekly_schedule(day: Weekday, time: &str) -> RotationSchedule {
        RotationSchedule {
            weekly: WeeklyRotation {
                enabled: true,
                day,
                time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            },
            ..RotationSchedule::default()
        }
    }

    // 2025-06-02 is a Monday.
    fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, min, 0).unwrap()
    }

    #[test]
    fn test_daily_due_when_old_enough_and_past_time() {
        let schedule = daily_schedule("02:00");
        let now = at(2, 3, 0);
        assert!(is_rotation_due(&schedule, now - Duration::hours(25), now));
    }

    #[test]
    fn test_daily_not_due_before_configured_time() {
        let schedule = daily_schedule("02:00");
        let now = at(2, 1, 30);
        assert!(!is_rotation_due(&schedule, now - Duration::hours(25), now));
    }

    #[test]
    fn test_daily_not_due_for_young_key() {
        let schedule = daily_schedule("02:00");
        let now = at(2, 3, 0);
        assert!(!is_rotation_due(&schedule, now - Duration::hours(23), now));
    }

    #[test]
    fn test_disabled_policies_never_due() {
        let schedule = RotationSchedule::default();
        let now = at(2, 3, 0);
        assert!(!is_rotation_due(&schedule, now - Duration::days(30), now));
    }

    #[test]
    fn test_weekly_due_on_matching_day() {
        let schedule = weekly_schedule(Weekday::Mon, "03:00");
        let now = at(2, 3, 30);
        assert!(is_rotation_due(&schedule, now - Duration::days(8), now));
    }

    #[test]
    fn test_weekly_not_due_on_other_days() {
        let schedule = weekly_schedule(Weekday::Mon, "03:00");
        let now = at(3, 3, 30); // Tuesday
        assert!(!is_rotation_due(&schedule, now - Duration::days(8), now));
    }

    #[test]
    fn test_weekly_not_due_for_young_key() {
        let schedule = weekly_schedule(Weekday::Mon, "03:00");
        let now = at(2, 3, 30);
        assert!(!is_rotation_due(&schedule, now - Duration::days(6), now));
    }

    #[test]
    fn test_either_policy_suffices() {
        let mut schedule = weekly_schedule(Weekday::Mon, "03:00");
        schedule.daily = DailyRotation {
            enabled: true,
            time: NaiveTime::parse_from_str("02:00", "%H:%M").unwrap(),
        };
        // Tuesday, so weekly misses, but daily is due.
        let now = at(3, 3, 0);
        assert!(is_rotation_due(&schedule, now - Duration::days(2), now));
    }

    #[test]
    fn test_first_matching_trigger_follows_input_order() {
        let schedule = RotationSchedule {
            emergency: EmergencyRotation {
                enabled: true,
                triggers: vec!["breach".to_string(), "key_compromise".to_string()],
            },
            ..RotationSchedule::default()
        };
        let signals = vec![
            "unrelated".to_string(),
            "key_compromise".to_string(),
            "breach".to_string(),
        ];
        assert_eq!(
            first_matching_trigger(&schedule, &signals),
            Some("key_compromise")
        );
    }

    #[test]
    fn test_no_trigger_when_emergency_disabled() {
        let schedule = RotationSchedule {
            emergency: EmergencyRotation {
                enabled: false,
                triggers: vec!["breach".to_string()],
            },
            ..RotationSchedule::default()
        };
        let signals = vec!["breach".to_string()];
        assert_eq!(first_matching_trigger(&schedule, &signals), None);
    }
}
