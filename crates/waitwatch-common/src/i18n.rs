//! Lightweight i18n translation registry.
//!
//! Provides a centralized, static translation map keyed by `(locale, message_key)`.
//! Supported locales: `en`, `zh-CN`. No external i18n framework dependency.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Default locale when none is configured.
pub const DEFAULT_LOCALE: &str = "en";

/// Supported locales.
pub const SUPPORTED_LOCALES: &[&str] = &["en", "zh-CN"];

/// Central translation registry.
pub struct Translations {
    map: HashMap<(&'static str, &'static str), &'static str>,
}

impl Translations {
    /// Get a translated string for the given locale and key.
    /// Falls back to `en` if the locale is not found, then to the provided default.
    pub fn get<'a>(&self, locale: &str, key: &str, default: &'a str) -> &'a str {
        // &'static str outlives any 'a
        if let Some(&val) = self.map.get(&(locale, key)) {
            return val;
        }
        if locale != "en" {
            if let Some(&val) = self.map.get(&("en", key)) {
                return val;
            }
        }
        default
    }

    /// Get a translated template string for formatting.
    /// Returns `None` if no translation is found for any locale.
    pub fn get_template(&self, locale: &str, key: &str) -> Option<&'static str> {
        self.map
            .get(&(locale, key))
            .or_else(|| {
                if locale != "en" {
                    self.map.get(&("en", key))
                } else {
                    None
                }
            })
            .copied()
    }

    /// Looks up `key` and substitutes each `{name}` placeholder.
    ///
    /// # Examples
    ///
    /// ```
    /// use waitwatch_common::i18n::TRANSLATIONS;
    ///
    /// let msg = TRANSLATIONS.render(
    ///     "en",
    ///     "alert.threshold.above",
    ///     &[("field", "wait_weeks"), ("value", "16"), ("threshold", "12")],
    /// );
    /// assert_eq!(msg, "wait_weeks reached 16, above threshold 12");
    /// ```
    pub fn render(&self, locale: &str, key: &str, vars: &[(&str, &str)]) -> String {
        let template = self.get_template(locale, key).unwrap_or(key);
        fill(template, vars)
    }
}

/// Substitutes `{name}` placeholders in `template`.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Global translation singleton.
pub static TRANSLATIONS: LazyLock<Translations> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Helper macro to reduce boilerplate
    macro_rules! t {
        ($locale:expr, $key:expr, $val:expr) => {
            map.insert(($locale, $key), $val);
        };
    }

    // ---- Threshold rule ----
    t!(
        "en",
        "alert.threshold.above",
        "{field} reached {value}, above threshold {threshold}"
    );
    t!(
        "zh-CN",
        "alert.threshold.above",
        "{field}已达到{value}，超过阈值{threshold}"
    );
    t!(
        "en",
        "alert.threshold.below",
        "{field} fell to {value}, below threshold {threshold}"
    );
    t!(
        "zh-CN",
        "alert.threshold.below",
        "{field}降至{value}，低于阈值{threshold}"
    );
    t!(
        "en",
        "alert.threshold.equal",
        "{field} is {value}, matching threshold {threshold}"
    );
    t!("zh-CN", "alert.threshold.equal", "{field}为{value}，触发阈值条件");

    // ---- Trend rule ----
    t!(
        "en",
        "alert.trend.increase",
        "{field} rose by {change}% over the past {days} days"
    );
    t!(
        "zh-CN",
        "alert.trend.increase",
        "{field}在过去{days}天内上升了{change}%"
    );
    t!(
        "en",
        "alert.trend.decrease",
        "{field} fell by {change}% over the past {days} days"
    );
    t!(
        "zh-CN",
        "alert.trend.decrease",
        "{field}在过去{days}天内下降了{change}%"
    );
    t!(
        "en",
        "alert.trend.stable",
        "{field} stayed stable over the past {days} days"
    );
    t!("zh-CN", "alert.trend.stable", "{field}在过去{days}天内保持稳定");

    // ---- Comparison rule ----
    t!(
        "en",
        "alert.comparison.best",
        "Current {field} is {value}; {name} offers {best}"
    );
    t!(
        "zh-CN",
        "alert.comparison.best",
        "当前{field}为{value}，{name}仅需{best}"
    );
    t!(
        "en",
        "alert.comparison.more",
        ", plus {count} other faster options"
    );
    t!("zh-CN", "alert.comparison.more", "，另有{count}个更快选择");

    // ---- Recommended actions ----
    t!("en", "action.transfer", "Consider switching to {name}");
    t!("zh-CN", "action.transfer", "考虑转至{name}");
    t!(
        "en",
        "action.private_consultation",
        "View private care options"
    );
    t!("zh-CN", "action.private_consultation", "查看私立医疗选择");
    t!("en", "action.local_options", "Find nearby care options");
    t!("zh-CN", "action.local_options", "查找附近医疗选择");

    // ---- Tone ----
    t!("en", "style.casual", "Hi! {message}");
    t!("zh-CN", "style.casual", "嗨！{message}");
    t!("en", "style.urgent", "🚨 Urgent: {message}");
    t!("zh-CN", "style.urgent", "🚨 紧急提醒：{message}");

    Translations { map }
});

/// Check if a locale string is supported.
pub fn is_supported_locale(locale: &str) -> bool {
    SUPPORTED_LOCALES.contains(&locale)
}

/// Normalize locale: return the locale if supported, otherwise return the default.
pub fn normalize_locale(locale: &str) -> &str {
    if is_supported_locale(locale) {
        locale
    } else {
        DEFAULT_LOCALE
    }
}
