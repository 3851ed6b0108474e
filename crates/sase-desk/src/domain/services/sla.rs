//! SLA deadline and consumption service

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::calendar::BusinessCalendar;
use crate::domain::rules::{SlaPolicy, SlaTarget};
use crate::domain::snapshot::TicketSnapshot;
use crate::error::{DeskError, DeskResult};

/// Percent consumed never reported above this.
pub const MAX_PERCENT_CONSUMED: f64 = 200.0;

/// Which SLA clock is running
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaPhase {
    /// No agent has responded yet
    AwaitingResponse,
    AwaitingResolution,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SlaDeadlines {
    pub response: DateTime<Utc>,
    pub resolution: DateTime<Utc>,
}

/// State of the active clock for one ticket at one instant
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SlaStatus {
    pub policy_id: String,
    pub phase: SlaPhase,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub percent_consumed: f64,
    pub breached: bool,
}

/// Computes deadlines and percent consumed against a business calendar.
#[derive(Clone, Debug, Default)]
pub struct SlaCalculator {
    calendar: BusinessCalendar,
}

impl SlaCalculator {
    pub fn new(calendar: BusinessCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Instant at which `target` runs out for a clock started at `start`.
    pub fn deadline(&self, target: &SlaTarget, start: DateTime<Utc>) -> DeskResult<DateTime<Utc>> {
        self.advance(target, start, target.allowed())
    }

    pub fn deadlines(
        &self,
        policy: &SlaPolicy,
        created_at: DateTime<Utc>,
    ) -> DeskResult<SlaDeadlines> {
        Ok(SlaDeadlines {
            response: self.deadline(&policy.response_time, created_at)?,
            resolution: self.deadline(&policy.resolution_time, created_at)?,
        })
    }

    /// Clock time counted against `target` between `start` and `now`.
    pub fn elapsed(
        &self,
        target: &SlaTarget,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Duration {
        if target.business_hours_only {
            self.calendar.business_time_between(start, now)
        } else if now > start {
            now - start
        } else {
            Duration::zero()
        }
    }

    /// `elapsed / allowed * 100`, clamped to `[0, 200]`.
    pub fn percent_consumed(
        &self,
        target: &SlaTarget,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> f64 {
        let allowed = target.allowed().num_seconds();
        let elapsed = self.elapsed(target, start, now).num_seconds();
        if allowed <= 0 {
            return if elapsed > 0 { MAX_PERCENT_CONSUMED } else { 0.0 };
        }
        let percent = elapsed as f64 / allowed as f64 * 100.0;
        percent.clamp(0.0, MAX_PERCENT_CONSUMED)
    }

    /// Earliest instant at which the clock reaches `percent`.
    pub fn instant_at_percent(
        &self,
        target: &SlaTarget,
        start: DateTime<Utc>,
        percent: u32,
    ) -> DeskResult<DateTime<Utc>> {
        let seconds = target.allowed().num_seconds() as f64 * f64::from(percent) / 100.0;
        self.advance(target, start, Duration::seconds(seconds.ceil() as i64))
    }

    fn advance(
        &self,
        target: &SlaTarget,
        start: DateTime<Utc>,
        amount: Duration,
    ) -> DeskResult<DateTime<Utc>> {
        if target.business_hours_only {
            self.calendar.add_business_time(start, amount)
        } else {
            start
                .checked_add_signed(amount)
                .ok_or(DeskError::DeadlineOutOfRange { start })
        }
    }

    /// Active clock: response until the first agent response, resolution
    /// afterwards. Both clocks start when the ticket is created.
    pub fn active_target<'p>(
        &self,
        policy: &'p SlaPolicy,
        ticket: &TicketSnapshot) -> (SlaPhase,
        &'p SlaTarget,
    ) {
        match ticket.first_responded_at {
            None => (SlaPhase::AwaitingResponse, &policy.response_time),
            Some(_) => (SlaPhase::AwaitingResolution, &policy.resolution_time),
        }
    }

    /// `ticket` with `sla_deadline` set to the active clock's deadline under
    /// `policy`, unless the store already supplied one.
    pub fn with_deadline(
        &self,
        policy: Option<&SlaPolicy>,
        ticket: TicketSnapshot,
    ) -> TicketSnapshot {
        let Some(policy) = policy.filter(|_| ticket.sla_deadline.is_none()) else {
            return ticket;
        };
        let (_, target) = self.active_target(policy, &ticket);
        match self.deadline(target, ticket.created_at) {
            Ok(deadline) => ticket.with_sla_deadline(deadline),
            Err(e) => {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    policy_id = %policy.header.id,
                    error = %e,
                    "No SLA deadline"
                );
                ticket
            }
        }
    }

    pub fn status(
        &self,
        policy: &SlaPolicy,
        ticket: &TicketSnapshot,
        now: DateTime<Utc>,
    ) -> DeskResult<SlaStatus> {
        let (phase, target) = self.active_target(policy, ticket);
        let started_at = ticket.created_at;
        let deadline = self.deadline(target, started_at)?;
        let percent_consumed = self.percent_consumed(target, started_at, now);
        Ok(SlaStatus {
            policy_id: policy.header.id.clone(),
            phase,
            started_at,
            deadline,
            percent_consumed,
            breached: percent_consumed >= 100.0 && now >= deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::RuleHeader;
    use chrono::TimeZone;

    fn friday_five_pm() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 6, 17, 0, 0).unwrap()
    }

    fn policy() -> SlaPolicy {
        SlaPolicy::new(
            RuleHeader::new("standard", "Standard"),
            SlaTarget::business_hours(4.0),
            SlaTarget::wall_clock(48.0),
        )
    }

    #[test]
    fn test_business_deadline_skips_weekend() {
        let calc = SlaCalculator::default();
        let deadlines = calc.deadlines(&policy(), friday_five_pm()).unwrap();
        assert_eq!(deadlines.response, Utc.with_ymd_and_hms(2026, 3, 9, 13, 0, 0).unwrap());
        assert_eq!(deadlines.resolution, Utc.with_ymd_and_hms(2026, 3, 8, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_weekend_does_not_consume_business_clock() {
        let calc = SlaCalculator::default();
        let target = SlaTarget::business_hours(4.0);
        let sunday = Utc.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap();
        assert_eq!(calc.percent_consumed(&target, friday_five_pm(), sunday), 0.0);
        let monday = Utc.with_ymd_and_hms(2026, 3, 9, 11, 0, 0).unwrap();
        assert_eq!(calc.percent_consumed(&target, friday_five_pm(), monday), 50.0);
    }

    #[test]
    fn test_percent_is_clamped() {
        let calc = SlaCalculator::default();
        let target = SlaTarget::wall_clock(1.0);
        let start = friday_five_pm();
        assert_eq!(calc.percent_consumed(&target, start, start - Duration::hours(1)), 0.0);
        assert_eq!(calc.percent_consumed(&target, start, start + Duration::minutes(90)), 150.0);
        assert_eq!(calc.percent_consumed(&target, start, start + Duration::days(3)), 200.0);
    }

    #[test]
    fn test_instant_at_percent() {
        let calc = SlaCalculator::default();
        let target = SlaTarget::business_hours(4.0);
        let at = calc.instant_at_percent(&target, friday_five_pm(), 75).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap());
        assert_eq!(calc.percent_consumed(&target, friday_five_pm(), at), 75.0);
    }

    #[test]
    fn test_status_switches_clock_after_first_response() {
        let calc = SlaCalculator::default();
        let created = Utc.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap();
        let now = created + Duration::hours(5);
        let ticket = TicketSnapshot::new("T-1", created);

        let status = calc.status(&policy(), &ticket, now).unwrap();
        assert_eq!(status.phase, SlaPhase::AwaitingResponse);
        assert!(status.breached);
        assert_eq!(status.percent_consumed, 125.0);

        let ticket = ticket.with_agent_reply(created + Duration::hours(1));
        let status = calc.status(&policy(), &ticket, now).unwrap();
        assert_eq!(status.phase, SlaPhase::AwaitingResolution);
        assert!(!status.breached);
    }

    #[test]
    fn test_with_deadline_follows_active_clock() {
        let calc = SlaCalculator::default();
        let created = Utc.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap();
        let ticket = calc.with_deadline(Some(&policy()), TicketSnapshot::new("T-1", created));
        assert_eq!(ticket.sla_deadline, Some(created + Duration::hours(4)));

        let answered =
            TicketSnapshot::new("T-2", created).with_agent_reply(created + Duration::hours(1));
        let answered = calc.with_deadline(Some(&policy()), answered);
        assert_eq!(answered.sla_deadline, Some(created + Duration::hours(48)));

        let supplied = TicketSnapshot::new("T-3", created).with_sla_deadline(created);
        assert_eq!(calc.with_deadline(Some(&policy()), supplied).sla_deadline, Some(created));
        assert_eq!(
            calc.with_deadline(None, TicketSnapshot::new("T-4", created)).sla_deadline,
            None
        );
    }

    #[test]
    fn test_deadline_past_end_of_time_is_an_error() {
        let calc = SlaCalculator::default();
        let start = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let err = calc.deadline(&SlaTarget::wall_clock(2.0), start).unwrap_err();
        assert!(matches!(err, DeskError::DeadlineOutOfRange { .. }));
        let ticket = calc.with_deadline(Some(&policy()), TicketSnapshot::new("T-1", start));
        assert_eq!(ticket.sla_deadline, None);
    }
}
