use crate::evaluators::{locale_for, triggered_result};
use crate::RuleEvaluator;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use waitwatch_common::i18n::TRANSLATIONS;
use waitwatch_common::rule::{Rule, RuleConditions, RuleKind, TrendType};
use waitwatch_common::types::{parse_numeric, AlertResult, EvaluationContext};

/// Fires on a sustained increase, decrease or flat line of a field over
/// the trailing `period_days` of history.
///
/// Direction comes from the least-squares slope over the sample index;
/// magnitude is the percent change between the first and last sample in
/// the window.
pub struct TrendEvaluator;

impl RuleEvaluator for TrendEvaluator {
    fn supports(&self, kind: RuleKind) -> bool {
        kind == RuleKind::Trend
    }

    fn evaluate(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AlertResult>> {
        let RuleConditions::Trend(cond) = &rule.conditions else {
            anyhow::bail!("trend evaluator cannot evaluate a {} rule", rule.kind());
        };

        // A window reaching past the representable range covers all history
        let cutoff = Duration::try_days(i64::from(cond.period_days))
            .and_then(|period| now.checked_sub_signed(period));
        let values: Vec<f64> = context
            .historical_values
            .iter()
            .filter(|sample| {
                sample
                    .timestamp
                    .is_some_and(|ts| cutoff.map_or(true, |cutoff| ts >= cutoff))
            })
            .filter_map(|sample| sample.values.get(&cond.field).and_then(parse_numeric))
            .collect();

        if values.len() < 2 {
            return Ok(None);
        }

        let Some(slope) = index_slope(&values) else {
            return Ok(None);
        };
        let change_percent = percent_change(&values);

        let triggered = match cond.trend_type {
            TrendType::Increase => slope > 0.0 && change_percent >= cond.min_change_percent,
            TrendType::Decrease => slope < 0.0 && change_percent.abs() >= cond.min_change_percent,
            TrendType::Stable => change_percent.abs() < cond.min_change_percent,
        };
        if !triggered {
            return Ok(None);
        }

        let key = match cond.trend_type {
            TrendType::Increase => "alert.trend.increase",
            TrendType::Decrease => "alert.trend.decrease",
            TrendType::Stable => "alert.trend.stable",
        };
        let change_str = format!("{:.1}", change_percent.abs());
        let days_str = cond.period_days.to_string();
        let message = TRANSLATIONS.render(
            locale_for(context),
            key,
            &[
                ("field", cond.field.as_str()),
                ("change", change_str.as_str()),
                ("days", days_str.as_str()),
            ],
        );

        Ok(Some(triggered_result(
            rule,
            context,
            message,
            json!({
                "field": cond.field,
                "trend_type": cond.trend_type.to_string(),
                "change_percent": change_percent,
                "period_days": cond.period_days,
                "slope": slope,
                "samples": values.len(),
            }),
            Vec::new(),
            now,
        )))
    }
}

/// First-degree least-squares slope with `x` = sample index.
pub fn index_slope(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;

    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }

    Some((n * sum_xy - sum_x * sum_y) / denom)
}

/// `(last - first) / first * 100`, or 0 when the series starts at zero.
pub fn percent_change(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if first != 0.0 => (last - first) / first * 100.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waitwatch_common::rule::{NewRule, TrendConditions};
    use waitwatch_common::types::{HistoricalSample, Severity};

    fn rule(trend_type: TrendType, period_days: u32, min_change_percent: f64) -> Rule {
        NewRule::new(
            "Wait trend",
            Severity::Medium,
            RuleConditions::Trend(TrendConditions {
                field: "wait_weeks".into(),
                trend_type,
                period_days,
                min_change_percent,
            }),
        )
        .into_rule(Utc::now())
    }

    /// One sample per day, ending yesterday.
    fn series(values: &[f64], now: DateTime<Utc>) -> EvaluationContext {
        let n = values.len() as i64;
        values
            .iter()
            .enumerate()
            .fold(EvaluationContext::new("s-1"), |context, (i, v)| {
                let ts = now - Duration::days(n - i as i64);
                context.with_sample(HistoricalSample::new(ts).with_value("wait_weeks", *v))
            })
    }

    fn fires(rule: &Rule, values: &[f64]) -> bool {
        let now = Utc::now();
        TrendEvaluator
            .evaluate(rule, &series(values, now), now)
            .unwrap()
            .is_some()
    }

    #[test]
    fn decrease_fires_on_falling_series() {
        let now = Utc::now();
        let result = TrendEvaluator
            .evaluate(
                &rule(TrendType::Decrease, 30, 5.0),
                &series(&[20.0, 18.0, 15.0], now),
                now,
            )
            .unwrap()
            .unwrap();

        assert_eq!(result.message, "wait_weeks fell by 25.0% over the past 30 days");
        assert_eq!(result.data["change_percent"], json!(-25.0));
        assert!(!fires(&rule(TrendType::Decrease, 30, 5.0), &[15.0, 18.0, 20.0]));
        assert!(!fires(&rule(TrendType::Increase, 30, 5.0), &[20.0, 18.0, 15.0]));
    }

    #[test]
    fn stable_fires_only_below_min_change() {
        let stable = rule(TrendType::Stable, 30, 5.0);
        assert!(fires(&stable, &[10.0, 10.2, 10.2]));
        assert!(fires(&stable, &[10.0, 9.8]));
        assert!(!fires(&stable, &[10.0, 11.0]));
        assert!(!fires(&stable, &[10.0, 9.0]));
    }

    #[test]
    fn series_starting_at_zero_has_no_percent_change() {
        assert_eq!(percent_change(&[0.0, 5.0, 10.0]), 0.0);
        assert!(!fires(&rule(TrendType::Increase, 30, 5.0), &[0.0, 5.0, 10.0]));
        assert!(fires(&rule(TrendType::Increase, 30, 0.0), &[0.0, 5.0, 10.0]));
    }

    #[test]
    fn min_change_percent_is_inclusive() {
        let increase = rule(TrendType::Increase, 30, 50.0);
        assert!(fires(&increase, &[100.0, 150.0]));
        assert!(!fires(&increase, &[100.0, 149.0]));

        let decrease = rule(TrendType::Decrease, 30, 50.0);
        assert!(fires(&decrease, &[100.0, 50.0]));
        assert!(!fires(&decrease, &[100.0, 51.0]));
    }

    #[test]
    fn samples_outside_the_window_are_ignored() {
        let now = Utc::now();
        let context = series(&[10.0, 12.0], now).with_sample(
            HistoricalSample::new(now - Duration::days(30)).with_value("wait_weeks", 100.0),
        );
        let result = TrendEvaluator
            .evaluate(&rule(TrendType::Increase, 7, 5.0), &context, now)
            .unwrap()
            .unwrap();
        assert_eq!(result.data["samples"], json!(2));
    }

    #[test]
    fn period_beyond_calendar_range_covers_all_history() {
        let now = Utc::now();
        let context = EvaluationContext::new("s-1")
            .with_sample(
                HistoricalSample::new(now - Duration::days(3650)).with_value("wait_weeks", 10.0),
            )
            .with_sample(HistoricalSample::new(now).with_value("wait_weeks", 12.0));

        let result = TrendEvaluator
            .evaluate(&rule(TrendType::Increase, 200_000_000, 5.0), &context, now)
            .unwrap();
        assert!(result.is_some());

        let widest = rule(TrendType::Increase, u32::MAX, 5.0);
        assert!(TrendEvaluator.evaluate(&widest, &context, now).unwrap().is_some());
    }
}
