//! `String.prototype` methods, including the regex-dispatched group
//! (`match`, `replace`, `search`, `split`, `replaceAll`, `matchAll`), which
//! rides on the host regex engine.

use std::rc::Rc;

use crate::{
    ast::Span,
    builtins::NativeFn,
    error::{RunError, RunResult},
    heap::{NativeIterator, ObjectData, PropKey},
    interp::{Interp, ops},
    value::{Value, utf16_len},
};

/// Member lookup on string receivers.
pub(crate) fn member(interp: &Interp, s: &Rc<str>, key: &PropKey) -> RunResult<Value> {
    let PropKey::Str(name) = key else {
        return Ok(Value::Undefined);
    };
    if &**name == "length" {
        return Ok(Value::Num(utf16_len(s) as f64));
    }
    if let Ok(index) = name.parse::<usize>() {
        let _ = interp;
        return Ok(unit_slice(s, index, index + 1).map_or(Value::Undefined, Value::str));
    }
    let f = match &**name {
        "charAt" => NativeFn::StringCharAt,
        "charCodeAt" => NativeFn::StringCharCodeAt,
        "at" => NativeFn::StringAt,
        "slice" => NativeFn::StringSlice,
        "substring" => NativeFn::StringSubstring,
        "indexOf" => NativeFn::StringIndexOf,
        "includes" => NativeFn::StringIncludes,
        "startsWith" => NativeFn::StringStartsWith,
        "endsWith" => NativeFn::StringEndsWith,
        "toUpperCase" => NativeFn::StringToUpperCase,
        "toLowerCase" => NativeFn::StringToLowerCase,
        "trim" => NativeFn::StringTrim,
        "split" => NativeFn::StringSplit,
        "repeat" => NativeFn::StringRepeat,
        "padStart" => NativeFn::StringPadStart,
        "padEnd" => NativeFn::StringPadEnd,
        "concat" => NativeFn::StringConcat,
        "replace" => NativeFn::StringReplace,
        "replaceAll" => NativeFn::StringReplaceAll,
        "match" => NativeFn::StringMatch,
        "matchAll" => NativeFn::StringMatchAll,
        "search" => NativeFn::StringSearch,
        "toString" => NativeFn::StringToString,
        _ => return Ok(Value::Undefined),
    };
    Ok(Value::Native(f))
}

/// Extracts the UTF-16 code units `[start, end)` as a string.
fn unit_slice(s: &str, start: usize, end: usize) -> Option<String> {
    let units: Vec<u16> = s.encode_utf16().collect();
    if start >= units.len() || end <= start {
        return None;
    }
    let end = end.min(units.len());
    Some(String::from_utf16_lossy(&units[start..end]))
}

/// UTF-16 index of a byte offset.
fn utf16_index(s: &str, byte_index: usize) -> usize {
    s[..byte_index].encode_utf16().count()
}

fn rel_index(n: f64, len: usize) -> usize {
    if n.is_nan() {
        return 0;
    }
    if n < 0.0 {
        len.saturating_sub((-n) as usize)
    } else {
        (n as usize).min(len)
    }
}

fn receiver_string(interp: &Interp, this: &Value) -> Rc<str> {
    match this {
        Value::Str(s) => s.clone(),
        other => {
            let st = interp.st();
            ops::to_string_simple(&st.heap, other).into()
        }
    }
}

enum PatternArg {
    Literal(String),
    Regex { regex: fancy_regex::Regex, global: bool },
}

fn pattern_arg(interp: &Interp, value: Option<&Value>, span: Span) -> RunResult<PatternArg> {
    match value {
        Some(Value::Ref(id)) => {
            let st = interp.st();
            if let ObjectData::Regex(re) = st.heap.get(*id) {
                return Ok(PatternArg::Regex {
                    regex: re.compiled.clone(),
                    global: re.is_global(),
                });
            }
            Ok(PatternArg::Literal(ops::to_string_simple(&st.heap, &Value::Ref(*id))))
        }
        Some(other) => {
            let st = interp.st();
            Ok(PatternArg::Literal(ops::to_string_simple(&st.heap, other)))
        }
        None => Err(RunError::type_error("missing pattern argument", Some(span))),
    }
}

/// Expands `$&`, `$1`…`$9`, and `$$` in a string replacement.
fn expand_replacement(template: &str, full: &str, groups: &[Option<String>]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                out.push_str(full);
            }
            Some(d) if d.is_ascii_digit() => {
                let index = d.to_digit(10).unwrap_or(0) as usize;
                chars.next();
                if index >= 1
                    && let Some(Some(group)) = groups.get(index - 1)
                {
                    out.push_str(group);
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

struct RegexHit {
    start: usize,
    end: usize,
    full: String,
    groups: Vec<Option<String>>,
}

fn regex_hits(regex: &fancy_regex::Regex, subject: &str, all: bool, span: Span) -> RunResult<Vec<RegexHit>> {
    let mut hits = Vec::new();
    for captures in regex.captures_iter(subject) {
        let captures = captures
            .map_err(|e| RunError::raised(crate::error::JsErrorKind::Generic, format!("regex error: {e}"), Some(span)))?;
        let full = captures.get(0).expect("group 0 is the match");
        hits.push(RegexHit {
            start: full.start(),
            end: full.end(),
            full: full.as_str().to_owned(),
            groups: (1..captures.len())
                .map(|i| captures.get(i).map(|m| m.as_str().to_owned()))
                .collect(),
        });
        if !all {
            break;
        }
    }
    Ok(hits)
}

async fn replacement_for(
    interp: &Interp,
    replacer: &Value,
    hit_full: &str,
    groups: &[Option<String>],
    index: usize,
    subject: &str,
    span: Span,
) -> RunResult<String> {
    match replacer {
        Value::Str(template) => Ok(expand_replacement(template, hit_full, groups)),
        callable @ (Value::Native(_) | Value::Ref(_)) => {
            let mut args = vec![Value::str(hit_full)];
            for group in groups {
                args.push(group.clone().map_or(Value::Undefined, Value::str));
            }
            args.push(Value::Num(index as f64));
            args.push(Value::str(subject));
            let result = interp.call_value(callable.clone(), Value::Undefined, args, span).await?;
            let st = interp.st();
            Ok(ops::to_string_simple(&st.heap, &result))
        }
        other => {
            let st = interp.st();
            Ok(ops::to_string_simple(&st.heap, other))
        }
    }
}

fn alloc_match_array(interp: &Interp, hit: &RegexHit) -> Value {
    let mut st = interp.st();
    let mut items = vec![Value::str(hit.full.as_str())];
    for group in &hit.groups {
        items.push(group.clone().map_or(Value::Undefined, Value::str));
    }
    Value::Ref(st.heap.alloc_array(items))
}

pub(crate) async fn call(interp: &Interp, f: NativeFn, this: Value, args: Vec<Value>, span: Span) -> RunResult<Value> {
    use NativeFn::*;

    // Regex receiver methods.
    if matches!(f, RegexTest | RegexExec) {
        let Value::Ref(id) = &this else {
            return Err(RunError::type_error("Regex method called on a non-regex", Some(span)));
        };
        let regex = {
            let st = interp.st();
            let ObjectData::Regex(re) = st.heap.get(*id) else {
                return Err(RunError::type_error("Regex method called on a non-regex", Some(span)));
            };
            re.compiled.clone()
        };
        let subject = receiver_string(interp, &args.first().cloned().unwrap_or(Value::Undefined));
        let hits = regex_hits(&regex, &subject, false, span)?;
        return match f {
            RegexTest => Ok(Value::Bool(!hits.is_empty())),
            _ => Ok(hits.first().map_or(Value::Null, |hit| alloc_match_array(interp, hit))),
        };
    }

    let s = receiver_string(interp, &this);
    let units_len = utf16_len(&s);

    match f {
        StringToString => Ok(Value::Str(s)),
        StringCharAt => {
            let index = {
                let st = interp.st();
                args.first().map_or(0.0, |v| ops::to_number(&st.heap, v))
            };
            if index < 0.0 {
                return Ok(Value::str(""));
            }
            Ok(unit_slice(&s, index as usize, index as usize + 1).map_or_else(|| Value::str(""), Value::str))
        }
        StringCharCodeAt => {
            let index = {
                let st = interp.st();
                args.first().map_or(0.0, |v| ops::to_number(&st.heap, v))
            };
            let units: Vec<u16> = s.encode_utf16().collect();
            if index < 0.0 || index as usize >= units.len() {
                return Ok(Value::Num(f64::NAN));
            }
            Ok(Value::Num(f64::from(units[index as usize])))
        }
        StringAt => {
            let n = {
                let st = interp.st();
                args.first().map_or(0.0, |v| ops::to_number(&st.heap, v))
            };
            let index = if n < 0.0 {
                let Some(index) = units_len.checked_sub((-n) as usize) else {
                    return Ok(Value::Undefined);
                };
                index
            } else {
                n as usize
            };
            Ok(unit_slice(&s, index, index + 1).map_or(Value::Undefined, Value::str))
        }
        StringSlice => {
            let (start, end) = {
                let st = interp.st();
                let start = match args.first() {
                    Some(Value::Undefined) | None => 0,
                    Some(v) => rel_index(ops::to_number(&st.heap, v), units_len),
                };
                let end = match args.get(1) {
                    Some(Value::Undefined) | None => units_len,
                    Some(v) => rel_index(ops::to_number(&st.heap, v), units_len),
                };
                (start, end)
            };
            Ok(unit_slice(&s, start, end).map_or_else(|| Value::str(""), Value::str))
        }
        StringSubstring => {
            let (mut start, mut end) = {
                let st = interp.st();
                let start = match args.first() {
                    Some(Value::Undefined) | None => 0,
                    Some(v) => (ops::to_number(&st.heap, v).max(0.0) as usize).min(units_len),
                };
                let end = match args.get(1) {
                    Some(Value::Undefined) | None => units_len,
                    Some(v) => (ops::to_number(&st.heap, v).max(0.0) as usize).min(units_len),
                };
                (start, end)
            };
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            Ok(unit_slice(&s, start, end).map_or_else(|| Value::str(""), Value::str))
        }
        StringIndexOf => {
            let needle = receiver_string(interp, &args.first().cloned().unwrap_or(Value::Undefined));
            Ok(Value::Num(
                s.find(&*needle).map_or(-1.0, |byte| utf16_index(&s, byte) as f64),
            ))
        }
        StringIncludes => {
            let needle = receiver_string(interp, &args.first().cloned().unwrap_or(Value::Undefined));
            Ok(Value::Bool(s.contains(&*needle)))
        }
        StringStartsWith => {
            let needle = receiver_string(interp, &args.first().cloned().unwrap_or(Value::Undefined));
            Ok(Value::Bool(s.starts_with(&*needle)))
        }
        StringEndsWith => {
            let needle = receiver_string(interp, &args.first().cloned().unwrap_or(Value::Undefined));
            Ok(Value::Bool(s.ends_with(&*needle)))
        }
        StringToUpperCase => Ok(Value::str(s.to_uppercase())),
        StringToLowerCase => Ok(Value::str(s.to_lowercase())),
        StringTrim => Ok(Value::str(s.trim())),
        StringRepeat => {
            let count = {
                let st = interp.st();
                args.first().map_or(0.0, |v| ops::to_number(&st.heap, v))
            };
            if count < 0.0 || !count.is_finite() {
                return Err(RunError::range_error("Invalid count value", Some(span)));
            }
            Ok(Value::str(s.repeat(count as usize)))
        }
        StringPadStart | StringPadEnd => {
            let (target, pad) = {
                let st = interp.st();
                let target = args.first().map_or(0.0, |v| ops::to_number(&st.heap, v)) as usize;
                let pad = match args.get(1) {
                    Some(Value::Undefined) | None => " ".to_owned(),
                    Some(v) => ops::to_string_simple(&st.heap, v),
                };
                (target, pad)
            };
            if target <= units_len || pad.is_empty() {
                return Ok(Value::Str(s));
            }
            let mut padding = String::new();
            while utf16_len(&padding) < target - units_len {
                padding.push_str(&pad);
            }
            let needed = target - units_len;
            let padding = unit_slice(&padding, 0, needed).unwrap_or(padding);
            Ok(Value::str(if f == StringPadStart {
                format!("{padding}{s}")
            } else {
                format!("{s}{padding}")
            }))
        }
        StringConcat => {
            let mut out = s.to_string();
            let st = interp.st();
            for arg in &args {
                out.push_str(&ops::to_string_simple(&st.heap, arg));
            }
            Ok(Value::str(out))
        }
        StringSplit => {
            let limit = {
                let st = interp.st();
                match args.get(1) {
                    Some(Value::Undefined) | None => usize::MAX,
                    Some(v) => ops::to_number(&st.heap, v) as usize,
                }
            };
            let parts: Vec<Value> = match pattern_arg(interp, args.first(), span) {
                Err(_) => vec![Value::Str(s.clone())],
                Ok(PatternArg::Literal(sep)) => {
                    if sep.is_empty() {
                        s.chars().take(limit).map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(&sep).take(limit).map(Value::str).collect()
                    }
                }
                Ok(PatternArg::Regex { regex, .. }) => {
                    let hits = regex_hits(&regex, &s, true, span)?;
                    let mut parts = Vec::new();
                    let mut cursor = 0;
                    for hit in hits {
                        if parts.len() >= limit {
                            break;
                        }
                        parts.push(Value::str(&s[cursor..hit.start]));
                        cursor = hit.end.max(cursor);
                    }
                    if parts.len() < limit {
                        parts.push(Value::str(&s[cursor..]));
                    }
                    parts
                }
            };
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(parts)))
        }
        StringSearch => match pattern_arg(interp, args.first(), span)? {
            PatternArg::Literal(needle) => Ok(Value::Num(
                s.find(&needle).map_or(-1.0, |byte| utf16_index(&s, byte) as f64),
            )),
            PatternArg::Regex { regex, .. } => {
                let hits = regex_hits(&regex, &s, false, span)?;
                Ok(Value::Num(hits.first().map_or(-1.0, |hit| utf16_index(&s, hit.start) as f64)))
            }
        },
        StringMatch => match pattern_arg(interp, args.first(), span)? {
            PatternArg::Literal(needle) => {
                if let Some(byte) = s.find(&needle) {
                    let _ = byte;
                    let mut st = interp.st();
                    Ok(Value::Ref(st.heap.alloc_array(vec![Value::str(needle)])))
                } else {
                    Ok(Value::Null)
                }
            }
            PatternArg::Regex { regex, global } => {
                let hits = regex_hits(&regex, &s, global, span)?;
                if hits.is_empty() {
                    return Ok(Value::Null);
                }
                if global {
                    let items: Vec<Value> = hits.iter().map(|hit| Value::str(hit.full.as_str())).collect();
                    let mut st = interp.st();
                    Ok(Value::Ref(st.heap.alloc_array(items)))
                } else {
                    Ok(alloc_match_array(interp, &hits[0]))
                }
            }
        },
        StringMatchAll => match pattern_arg(interp, args.first(), span)? {
            PatternArg::Regex { regex, global } => {
                if !global {
                    return Err(RunError::type_error(
                        "matchAll must be called with a global RegExp",
                        Some(span),
                    ));
                }
                let hits = regex_hits(&regex, &s, true, span)?;
                let values: Vec<Value> = hits.iter().map(|hit| alloc_match_array(interp, hit)).collect();
                let mut st = interp.st();
                Ok(Value::Ref(st.heap.alloc(ObjectData::NativeIterator(NativeIterator::Values {
                    values,
                    index: 0,
                }))))
            }
            PatternArg::Literal(_) => Err(RunError::type_error(
                "matchAll must be called with a global RegExp",
                Some(span),
            )),
        },
        StringReplace | StringReplaceAll => {
            let replacer = args.get(1).cloned().unwrap_or(Value::Undefined);
            match pattern_arg(interp, args.first(), span)? {
                PatternArg::Literal(needle) => {
                    let all = f == StringReplaceAll;
                    let mut out = String::new();
                    let mut cursor = 0;
                    while let Some(found) = s[cursor..].find(&needle) {
                        let at = cursor + found;
                        out.push_str(&s[cursor..at]);
                        let replacement =
                            replacement_for(interp, &replacer, &needle, &[], utf16_index(&s, at), &s, span).await?;
                        out.push_str(&replacement);
                        cursor = at + needle.len().max(1);
                        if !all || needle.is_empty() {
                            break;
                        }
                    }
                    out.push_str(&s[cursor.min(s.len())..]);
                    Ok(Value::str(out))
                }
                PatternArg::Regex { regex, global } => {
                    // `replaceAll` insists on a global regex; `replace`
                    // follows the regex's own flag.
                    if f == StringReplaceAll && !global {
                        return Err(RunError::type_error(
                            "replaceAll must be called with a global RegExp",
                            Some(span),
                        ));
                    }
                    let all = if f == StringReplaceAll { true } else { global };
                    let hits = regex_hits(&regex, &s, all, span)?;
                    let mut out = String::new();
                    let mut cursor = 0;
                    for hit in &hits {
                        out.push_str(&s[cursor..hit.start]);
                        let replacement = replacement_for(
                            interp,
                            &replacer,
                            &hit.full,
                            &hit.groups,
                            utf16_index(&s, hit.start),
                            &s,
                            span,
                        )
                        .await?;
                        out.push_str(&replacement);
                        cursor = hit.end;
                    }
                    out.push_str(&s[cursor..]);
                    Ok(Value::str(out))
                }
            }
        }
        _ => unreachable!("non-string native routed to string::call"),
    }
}
