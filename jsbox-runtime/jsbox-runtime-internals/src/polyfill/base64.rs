//! The HTML `btoa` and `atob` pair.

use crate::marshal;
use data_encoding::{BASE64, BASE64_NOPAD};
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Value};

const ENCODE_RANGE_ERROR: &str = "Failed to execute 'btoa': The string to be encoded contains characters outside of the Latin1 range.";
const DECODE_ERROR: &str =
    "Failed to execute 'atob': The string to be decoded is not correctly encoded.";

pub(crate) fn install<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    globals.set(
        "btoa",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<String> {
                let text = first_argument(&ctx, "btoa", args.0)?;
                encode(&text).map_err(|msg| invalid_character(&ctx, msg))
            },
        )?,
    )?;
    globals.set(
        "atob",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<String> {
                let text = first_argument(&ctx, "atob", args.0)?;
                decode(&text).map_err(|msg| invalid_character(&ctx, msg))
            },
        )?,
    )?;
    Ok(())
}

fn first_argument<'js>(
    ctx: &Ctx<'js>,
    function: &str,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<String> {
    match args.into_iter().next() {
        Some(value) => marshal::render(ctx, value),
        None => Err(Exception::throw_type(
            ctx,
            &format!(
                "Failed to execute '{}': 1 argument required, but only 0 present.",
                function
            ),
        )),
    }
}

fn invalid_character<'js>(ctx: &Ctx<'js>, message: &str) -> rquickjs::Error {
    let built = Exception::from_message(ctx.clone(), message).and_then(|exception| {
        let obj = exception.into_object();
        obj.set("name", "InvalidCharacterError")?;
        Ok(obj)
    });
    match built {
        Ok(obj) => ctx.throw(obj.into_value()),
        Err(e) => e,
    }
}

/// Encode a string of Latin-1 code points.
pub(crate) fn encode(text: &str) -> Result<String, &'static str> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        if code > 0xFF {
            return Err(ENCODE_RANGE_ERROR);
        }
        bytes.push(code as u8);
    }
    Ok(BASE64.encode(&bytes))
}

/// Decode with the forgiving rules of the HTML standard: ASCII whitespace is ignored, padding is
/// optional and unused trailing bits are not checked.
pub(crate) fn decode(text: &str) -> Result<String, &'static str> {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\x0C' | '\r' | ' '))
        .collect();
    if cleaned.len() % 4 == 0 {
        if cleaned.ends_with("==") {
            cleaned.truncate(cleaned.len() - 2);
        } else if cleaned.ends_with('=') {
            cleaned.truncate(cleaned.len() - 1);
        }
    }
    if cleaned.len() % 4 == 1 {
        return Err(DECODE_ERROR);
    }

    let mut spec = BASE64_NOPAD.specification();
    spec.check_trailing_bits = false;
    let forgiving = spec.encoding().map_err(|_| DECODE_ERROR)?;
    let bytes = forgiving
        .decode(cleaned.as_bytes())
        .map_err(|_| DECODE_ERROR)?;
    Ok(bytes.into_iter().map(char::from).collect())
}
