//! Conversion between host [`Val`](../val/enum.Val.html)s and guest values.
//!
//! Scalars convert directly. Sequences and mappings are copied through JSON in both directions,
//! which never walks the guest object graph and so cannot loop on cycles. Error objects go through
//! the identity registry so a host error that crossed into the guest comes back as itself.

use crate::error::Error;
use crate::host_error::HostError;
use crate::registry::IdentityRegistry;
use crate::translate;
use crate::val::Val;
use num_bigint::BigInt;
use rquickjs::{qjs, Ctx, Exception, Function, Type, Value};
use std::slice;

pub fn host_to_guest<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    val: &Val,
) -> rquickjs::Result<Value<'js>> {
    let value = match val {
        Val::Null => Value::new_null(ctx.clone()),
        Val::Undefined => Value::new_undefined(ctx.clone()),
        Val::NaN => Value::new_float(ctx.clone(), f64::NAN),
        Val::Bool(b) => Value::new_bool(ctx.clone(), *b),
        Val::Int(i) => call_global(ctx, "Number", i.to_string())?,
        Val::Float(f) => call_global(ctx, "Number", float_text(*f))?,
        Val::BigInt(b) => call_global(ctx, "BigInt", b.to_string())?,
        Val::String(s) => new_string(ctx, s)?,
        Val::Array(_) | Val::Object(_) => {
            let json = serde_json::to_string(val)
                .map_err(|e| Exception::throw_internal(ctx, &e.to_string()))?;
            ctx.json_parse(json)?
        }
        Val::Error(e) => translate::host_error_to_guest(ctx, registry, e)?,
        Val::Opaque(d) => new_string(ctx, &format!("{:?}", d))?,
    };
    Ok(value)
}

/// Whether converting a guest error that stands for a host error uses up its registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyUse {
    Consume,
    Retain,
}

pub fn guest_to_host<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    value: Value<'js>,
) -> Result<Val, Error> {
    convert(ctx, registry, value, KeyUse::Consume)
}

/// Like [`guest_to_host`], but a host error found through the registry stays registered.
pub fn guest_to_host_retaining<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    value: Value<'js>,
) -> Result<Val, Error> {
    convert(ctx, registry, value, KeyUse::Retain)
}

fn convert<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    value: Value<'js>,
    key_use: KeyUse,
) -> Result<Val, Error> {
    if value.is_promise() {
        return Err(Error::AsyncValue);
    }
    match value.type_of() {
        Type::Undefined => Ok(Val::Undefined),
        Type::Null => Ok(Val::Null),
        Type::Bool => Ok(Val::Bool(value.as_bool().unwrap_or(false))),
        Type::Int => Ok(Val::Int(value.as_int().map_or(0, i64::from))),
        Type::Float => match value.as_float() {
            Some(f) if !f.is_nan() => Ok(Val::Float(f)),
            _ => Ok(Val::NaN),
        },
        Type::String => {
            let text = render(ctx, value).map_err(|e| translate::from_js_error(ctx, registry, None, e))?;
            Ok(Val::String(text))
        }
        Type::Symbol => Ok(Val::Null),
        Type::BigInt => {
            let text = render(ctx, value).map_err(|e| translate::from_js_error(ctx, registry, None, e))?;
            text.parse::<BigInt>()
                .map(Val::BigInt)
                .map_err(|e| jsbox_format_err!("guest produced an unparsable big integer {:?}: {}", text, e))
        }
        Type::Exception => match value.as_object() {
            Some(obj) => {
                let registered = match key_use {
                    KeyUse::Consume => translate::take_registered(registry, obj),
                    KeyUse::Retain => translate::peek_registered(registry, obj),
                };
                let err = match registered {
                    Some(host) => host,
                    None => HostError::new(translate::error_object_to_error(ctx, obj)),
                };
                Ok(Val::Error(err))
            }
            None => Ok(Val::Null),
        },
        _ => structured(ctx, registry, value),
    }
}

fn structured<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    value: Value<'js>,
) -> Result<Val, Error> {
    let json = match ctx.json_stringify(value) {
        Ok(Some(json)) => json,
        // functions and other values JSON has no notation for
        Ok(None) => return Ok(Val::Undefined),
        Err(e) => return Err(translate::from_js_error(ctx, registry, None, e)),
    };
    let text = string_text(&json).map_err(|e| translate::from_js_error(ctx, registry, None, e))?;
    let parsed = serde_json::from_str::<serde_json::Value>(&text)
        .or_else(|_| serde_json::from_str(&scrub_surrogate_escapes(&text)));
    match parsed {
        Ok(json) => Ok(Val::from(json)),
        Err(e) => {
            tracing::debug!("guest JSON could not be read back: {}", e);
            Ok(Val::Null)
        }
    }
}

/// Replace the `\uXXXX` escapes the guest writes for lone surrogates, which JSON readers reject.
fn scrub_surrogate_escapes(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let rest = &json[i + 1..];
        let lone = rest.starts_with('u') && rest.get(1..5).map_or(false, is_surrogate_escape);
        if lone {
            out.push_str("\\ufffd");
            chars.nth(4);
        } else {
            out.push(c);
            if let Some((_, escaped)) = chars.next() {
                out.push(escaped);
            }
        }
    }
    out
}

fn is_surrogate_escape(hex: &str) -> bool {
    u16::from_str_radix(hex, 16).map_or(false, |unit| (0xd800..=0xdfff).contains(&unit))
}

/// The guest's own `String(value)`.
pub(crate) fn render<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<String> {
    if let Some(s) = value.as_string() {
        return string_text(s);
    }
    let string: Function = ctx.globals().get("String")?;
    let rendered: rquickjs::String = string.call((value,))?;
    string_text(&rendered)
}

/// Host text of a guest string. Unpaired surrogates become U+FFFD.
pub(crate) fn string_text(s: &rquickjs::String<'_>) -> rquickjs::Result<String> {
    match s.to_string() {
        Err(rquickjs::Error::Utf8(_)) => raw_string_text(s),
        res => res,
    }
}

fn raw_string_text(s: &rquickjs::String<'_>) -> rquickjs::Result<String> {
    let ctx = s.ctx().as_raw().as_ptr();
    let mut len: usize = 0;
    // The buffer belongs to the engine until it is handed back with `JS_FreeCString`.
    let ptr = unsafe { qjs::JS_ToCStringLen(ctx, &mut len, s.as_value().as_raw()) };
    if ptr.is_null() {
        return Err(rquickjs::Error::Unknown);
    }
    let text = {
        let bytes = unsafe { slice::from_raw_parts(ptr as *const u8, len) };
        decode_wtf8(bytes)
    };
    unsafe { qjs::JS_FreeCString(ctx, ptr) };
    Ok(text)
}

/// Decode the engine's string bytes, which are UTF-8 except that a lone surrogate keeps its
/// three-byte encoding.
fn decode_wtf8(mut bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                text.push_str(valid);
                return text;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                text.push('\u{fffd}');
                let skip = if encodes_surrogate(rest) {
                    3
                } else {
                    e.error_len().unwrap_or_else(|| rest.len())
                };
                bytes = &rest[skip..];
            }
        }
    }
}

fn encodes_surrogate(bytes: &[u8]) -> bool {
    match bytes {
        [0xed, second, third, ..] => (0xa0..=0xbf).contains(second) && (0x80..=0xbf).contains(third),
        _ => false,
    }
}

pub(crate) fn new_string<'js>(ctx: &Ctx<'js>, s: &str) -> rquickjs::Result<Value<'js>> {
    Ok(rquickjs::String::from_str(ctx.clone(), s)?.into_value())
}

fn call_global<'js>(ctx: &Ctx<'js>, name: &str, text: String) -> rquickjs::Result<Value<'js>> {
    let ctor: Function = ctx.globals().get(name)?;
    ctor.call((text,))
}

/// Text that the guest's `Number` parses back to exactly `f`.
fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_owned()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_owned()
    } else {
        f.to_string()
    }
}
