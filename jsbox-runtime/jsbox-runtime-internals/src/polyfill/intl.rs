//! An `Intl` namespace carrying only the `en-US` locale.
//!
//! The engine has no built-in `Intl`. The classes are thin guest-side wrappers that validate
//! options the way the standard does and hand the formatting itself to host functions. Requests
//! for other locales resolve to `en-US`, and dates are always rendered in UTC.

use rquickjs::{Ctx, Function};

const GLUE: &str = r#"
(function (formatNumber, pluralCategory, formatDate) {
  'use strict';
  const LOCALE = 'en-US';
  const TAG = /^[a-z]{2,3}(-[a-z0-9]{2,8})*$/i;

  function localeList(locales) {
    if (locales === undefined) return [];
    if (typeof locales !== 'string' && !Array.isArray(locales)) {
      throw new TypeError('Incorrect locale information provided');
    }
    return [].concat(locales).map(canonicalize);
  }

  function canonicalize(tag) {
    const text = String(tag);
    if (!TAG.test(text)) throw new RangeError('Incorrect locale information provided');
    return text.split('-').map((part, i) => {
      if (i === 0) return part.toLowerCase();
      if (part.length === 4) return part[0].toUpperCase() + part.slice(1).toLowerCase();
      if (part.length === 2 || /^[0-9]{3}$/.test(part)) return part.toUpperCase();
      return part.toLowerCase();
    }).join('-');
  }

  function getCanonicalLocales(locales) {
    return [...new Set(localeList(locales))];
  }

  function supportedLocalesOf(locales) {
    return getCanonicalLocales(locales).filter(tag => /^en(-|$)/.test(tag));
  }

  function digits(value, fallback, name) {
    if (value === undefined) return fallback;
    const n = Math.floor(Number(value));
    if (!(n >= 0 && n <= 20)) throw new RangeError(name + ' value is out of range.');
    return n;
  }

  class NumberFormat {
    #options;
    constructor(locales, options) {
      localeList(locales);
      const o = options === undefined ? {} : Object(options);
      const style = o.style === undefined ? 'decimal' : String(o.style);
      if (style !== 'decimal' && style !== 'percent') {
        throw new RangeError('Value ' + style + ' out of range for Intl.NumberFormat options property style');
      }
      const minimumFractionDigits = digits(o.minimumFractionDigits, 0, 'minimumFractionDigits');
      const fallbackMax = Math.max(minimumFractionDigits, style === 'percent' ? 0 : 3);
      const maximumFractionDigits = digits(o.maximumFractionDigits, fallbackMax, 'maximumFractionDigits');
      if (maximumFractionDigits < minimumFractionDigits) {
        throw new RangeError('maximumFractionDigits value is out of range.');
      }
      this.#options = {
        locale: LOCALE,
        numberingSystem: 'latn',
        style,
        minimumFractionDigits,
        maximumFractionDigits,
        useGrouping: o.useGrouping === undefined ? true : Boolean(o.useGrouping),
      };
    }
    format(value) {
      const o = this.#options;
      const percent = o.style === 'percent';
      const n = percent ? Number(value) * 100 : Number(value);
      const text = formatNumber(n, o.minimumFractionDigits, o.maximumFractionDigits, o.useGrouping);
      return percent ? text + '%' : text;
    }
    resolvedOptions() {
      return { ...this.#options };
    }
    static supportedLocalesOf(locales) {
      return supportedLocalesOf(locales);
    }
  }

  class PluralRules {
    #type;
    constructor(locales, options) {
      localeList(locales);
      const type = options === undefined || options.type === undefined ? 'cardinal' : String(options.type);
      if (type !== 'cardinal' && type !== 'ordinal') {
        throw new RangeError('Value ' + type + ' out of range for Intl.PluralRules options property type');
      }
      this.#type = type;
    }
    select(value) {
      return pluralCategory(Number(value), this.#type === 'ordinal');
    }
    resolvedOptions() {
      const pluralCategories = this.#type === 'ordinal' ? ['few', 'one', 'two', 'other'] : ['one', 'other'];
      return { locale: LOCALE, type: this.#type, pluralCategories };
    }
    static supportedLocalesOf(locales) {
      return supportedLocalesOf(locales);
    }
  }

  function dateOptions(locales, options, shown) {
    localeList(locales);
    const o = options === undefined ? {} : Object(options);
    if (o.timeZone !== undefined && String(o.timeZone).toUpperCase() !== 'UTC') {
      throw new RangeError('Invalid time zone specified: ' + o.timeZone);
    }
    const wantsTime = o.hour !== undefined || o.minute !== undefined || o.second !== undefined;
    const wantsDate = o.year !== undefined || o.month !== undefined || o.day !== undefined;
    const explicit = wantsDate || wantsTime;
    return {
      date: explicit ? wantsDate : shown !== 'time',
      time: explicit ? wantsTime : shown !== 'date',
      hour12: o.hour12 === undefined ? true : Boolean(o.hour12),
    };
  }

  function renderLocal(date, parts) {
    return Number.isNaN(date.getTime()) ? 'Invalid Date' : renderDate(date, parts);
  }

  function renderDate(value, parts) {
    const ms = value === undefined ? Date.now() : Number(value);
    if (!Number.isFinite(ms)) throw new RangeError('Invalid time value');
    return formatDate(ms, parts.date, parts.time, parts.hour12);
  }

  class DateTimeFormat {
    #parts;
    constructor(locales, options) {
      this.#parts = dateOptions(locales, options, 'date');
    }
    format(value) {
      return renderDate(value, this.#parts);
    }
    resolvedOptions() {
      return {
        locale: LOCALE,
        calendar: 'gregory',
        numberingSystem: 'latn',
        timeZone: 'UTC',
        hour12: this.#parts.hour12,
      };
    }
    static supportedLocalesOf(locales) {
      return supportedLocalesOf(locales);
    }
  }

  function method(target, name, fn) {
    Object.defineProperty(target, name, { value: fn, writable: true, configurable: true });
  }

  method(globalThis, 'Intl', { getCanonicalLocales, NumberFormat, PluralRules, DateTimeFormat });
  method(Number.prototype, 'toLocaleString', function toLocaleString(locales, options) {
    return new NumberFormat(locales, options).format(this);
  });
  method(Date.prototype, 'toLocaleString', function toLocaleString(locales, options) {
    return renderLocal(this, dateOptions(locales, options, 'all'));
  });
  method(Date.prototype, 'toLocaleDateString', function toLocaleDateString(locales, options) {
    return renderLocal(this, dateOptions(locales, options, 'date'));
  });
  method(Date.prototype, 'toLocaleTimeString', function toLocaleTimeString(locales, options) {
    return renderLocal(this, dateOptions(locales, options, 'time'));
  });
})
"#;

pub(crate) fn install<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<()> {
    let glue: Function = ctx.eval(GLUE)?;
    let number = Function::new(
        ctx.clone(),
        |value: f64, min: f64, max: f64, grouping: bool| {
            format_number(value, min as usize, max as usize, grouping)
        },
    )?;
    let plural = Function::new(ctx.clone(), |value: f64, ordinal: bool| {
        plural_category(value, ordinal)
    })?;
    let date = Function::new(
        ctx.clone(),
        |ms: f64, date: bool, time: bool, hour12: bool| {
            format_date(ms, DateParts { date, time, hour12 })
        },
    )?;
    glue.call((number, plural, date))
}

/// Render a number the `en-US` way, rounding half away from zero to at most `max` fraction digits
/// and padding to at least `min`.
pub(crate) fn format_number(value: f64, min: usize, max: usize, grouping: bool) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value.is_infinite() {
        return format!("{}\u{221e}", sign);
    }

    let (whole, mut fraction) = split_rounded(value.abs(), max);
    while fraction.len() > min && fraction.ends_with('0') {
        fraction.pop();
    }
    let whole = if grouping { group(&whole) } else { whole };
    if fraction.is_empty() {
        format!("{}{}", sign, whole)
    } else {
        format!("{}{}.{}", sign, whole, fraction)
    }
}

fn split_rounded(abs: f64, max: usize) -> (String, String) {
    let scale = 10f64.powi(max as i32);
    let scaled = (abs * scale).round();
    if max <= 15 && scaled < 9_007_199_254_740_992.0 {
        let scaled = scaled as u64;
        let unit = 10u64.pow(max as u32);
        let whole = (scaled / unit).to_string();
        let fraction = format!("{:0width$}", scaled % unit, width = max);
        return (whole, if max == 0 { String::new() } else { fraction });
    }
    let text = format!("{:.*}", max, abs);
    match text.find('.') {
        Some(dot) => (text[..dot].to_string(), text[dot + 1..].to_string()),
        None => (text, String::new()),
    }
}

fn group(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// The English plural category of a number.
pub(crate) fn plural_category(value: f64, ordinal: bool) -> &'static str {
    if !ordinal {
        return if value.abs() == 1.0 { "one" } else { "other" };
    }
    if !value.is_finite() || value.fract() != 0.0 {
        return "other";
    }
    let n = value.abs() % 100.0;
    match (n % 10.0) as u8 {
        1 if n != 11.0 => "one",
        2 if n != 12.0 => "two",
        3 if n != 13.0 => "few",
        _ => "other",
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DateParts {
    pub(crate) date: bool,
    pub(crate) time: bool,
    pub(crate) hour12: bool,
}

/// Render a time value, in milliseconds since the epoch, as a UTC `en-US` date and time.
pub(crate) fn format_date(ms: f64, parts: DateParts) -> String {
    let secs = (ms / 1000.0).floor() as i64;
    let (year, month, day) = civil_from_days(secs.div_euclid(86_400));
    let of_day = secs.rem_euclid(86_400);
    let (hour, minute, second) = (of_day / 3600, of_day / 60 % 60, of_day % 60);

    let date = format!("{}/{}/{}", month, day, year);
    let time = if parts.hour12 {
        let shown = if hour % 12 == 0 { 12 } else { hour % 12 };
        let meridiem = if hour < 12 { "AM" } else { "PM" };
        format!("{}:{:02}:{:02} {}", shown, minute, second, meridiem)
    } else {
        format!("{:02}:{:02}:{:02}", hour, minute, second)
    };
    match (parts.date, parts.time) {
        (true, true) => format!("{}, {}", date, time),
        (false, true) => time,
        _ => date,
    }
}

/// Proleptic Gregorian year, month and day of a count of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}
