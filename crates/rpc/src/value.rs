//! A small, hand-rolled XML-RPC-shaped value codec: enough of the wire
//! format to carry method calls, `[status, message, payload]` triples, and
//! faults between directory/peer RPC participants. No external XML crate;
//! this crate owns its wire format end to end, the same way `graphnode-wire`
//! owns message/datagram framing by hand.

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_int(self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

/// Find the first top-level `<tag>...</tag>` span in `s`, tracking nesting
/// depth of same-named tags so arrays-of-arrays decode correctly. Returns
/// the inner content and everything after the matched closing tag.
fn extract(s: &str, tag: &str) -> Option<(String, String)> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = s.find(&open)?;

    let mut depth = 0usize;
    let mut i = start;
    let mut content_start = None;

    while i < s.len() {
        if s[i..].starts_with(&open) {
            depth += 1;
            if depth == 1 {
                content_start = Some(i + open.len());
            }
            i += open.len();
        } else if s[i..].starts_with(&close) {
            depth -= 1;
            if depth == 0 {
                let content = s[content_start.unwrap()..i].to_string();
                let rest = s[i + close.len()..].to_string();
                return Some((content, rest));
            }
            i += close.len();
        } else {
            let step = s[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
            i += step;
        }
    }

    None
}

fn decode_error(message: impl Into<String>) -> Fault {
    Fault { code: -1, message: message.into() }
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push_str(if *b { "1" } else { "0" });
            out.push_str("</boolean>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
    }
    out.push_str("</value>");
}

fn parse_value_inner(inner: &str) -> Result<Value, Fault> {
    // Dispatch on the outer tag only — a naive "does this tag appear
    // anywhere" search would wrongly match tags nested inside an array's
    // elements.
    let inner = inner.trim();

    if inner.starts_with("<int>") {
        let (content, _) = extract(inner, "int").unwrap();
        return content.trim().parse().map(Value::Int).map_err(|_| decode_error("malformed int"));
    }
    if inner.starts_with("<i4>") {
        let (content, _) = extract(inner, "i4").unwrap();
        return content.trim().parse().map(Value::Int).map_err(|_| decode_error("malformed i4"));
    }
    if inner.starts_with("<boolean>") {
        let (content, _) = extract(inner, "boolean").unwrap();
        return Ok(Value::Bool(content.trim() == "1"));
    }
    if inner.starts_with("<string>") {
        let (content, _) = extract(inner, "string").unwrap();
        return Ok(Value::Str(unescape(content.trim())));
    }
    if inner.starts_with("<array>") {
        let (content, _) = extract(inner, "array").unwrap();
        let (data, _) = extract(&content, "data").ok_or_else(|| decode_error("array missing data"))?;
        let mut values = Vec::new();
        let mut rest = data.as_str().to_string();
        while let Some((item, remainder)) = extract(&rest, "value") {
            values.push(parse_value_inner(item.trim())?);
            rest = remainder.trim_start().to_string();
        }
        return Ok(Value::Array(values));
    }

    Ok(Value::Str(unescape(inner)))
}

pub fn parse_value(s: &str) -> Result<Value, Fault> {
    let (inner, _) = extract(s.trim(), "value").ok_or_else(|| decode_error("missing value"))?;
    parse_value_inner(inner.trim())
}

pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

pub fn parse_call(body: &str) -> Result<(String, Vec<Value>), Fault> {
    let (method, _) = extract(body, "methodName").ok_or_else(|| decode_error("missing methodName"))?;
    let mut values = Vec::new();

    if let Some((params_block, _)) = extract(body, "params") {
        let mut rest = params_block;
        while let Some((param_inner, remainder)) = extract(&rest, "param") {
            values.push(parse_value(param_inner.trim())?);
            rest = remainder.trim_start().to_string();
        }
    }

    Ok((method.trim().to_string(), values))
}

pub fn encode_response(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><params><param>");
    encode_value(value, &mut out);
    out.push_str("</param></params></methodResponse>");
    out
}

pub fn encode_fault(code: i32, message: &str) -> String {
    let mut body = String::from("<struct><member><name>faultCode</name>");
    encode_value(&Value::Int(code), &mut body);
    body.push_str("</member><member><name>faultString</name>");
    encode_value(&Value::Str(message.to_string()), &mut body);
    body.push_str("</member></struct>");
    format!("<?xml version=\"1.0\"?><methodResponse><fault><value>{body}</value></fault></methodResponse>")
}

fn extract_member_value(struct_body: &str, name: &str) -> Option<Value> {
    let mut rest = struct_body.to_string();
    while let Some((member_inner, remainder)) = extract(&rest, "member") {
        if let Some((member_name, _)) = extract(&member_inner, "name") {
            if member_name.trim() == name {
                if let Some((value_inner, _)) = extract(&member_inner, "value") {
                    return parse_value_inner(value_inner.trim()).ok();
                }
            }
        }
        rest = remainder;
    }
    None
}

/// Parse a `methodResponse` body into either the response value or the
/// transport-level fault carried in it.
///
/// # Test
///
/// ```
/// use graphnode_rpc::value::{Value, encode_response, parse_response};
///
/// let body = encode_response(&Value::Array(vec![
///     Value::Int(1),
///     Value::Str(String::new()),
///     Value::Str("ok".into()),
/// ]));
///
/// let value = parse_response(&body).unwrap();
/// assert_eq!(value, Value::Array(vec![
///     Value::Int(1),
///     Value::Str(String::new()),
///     Value::Str("ok".into()),
/// ]));
/// ```
pub fn parse_response(body: &str) -> Result<Value, Fault> {
    if let Some((fault_inner, _)) = extract(body, "fault") {
        let (value_inner, _) = extract(&fault_inner, "value").ok_or_else(|| decode_error("malformed fault"))?;
        let code = extract_member_value(value_inner.trim(), "faultCode")
            .and_then(Value::into_int)
            .unwrap_or(-1);
        let message = extract_member_value(value_inner.trim(), "faultString")
            .and_then(Value::into_string)
            .unwrap_or_default();
        return Err(Fault { code, message });
    }

    let (params, _) = extract(body, "params").ok_or_else(|| decode_error("missing params"))?;
    let (param, _) = extract(&params, "param").ok_or_else(|| decode_error("missing param"))?;
    parse_value(param.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_round_trips() {
        let body = encode_call("registerPublisher", &[
            Value::Str("/node".into()),
            Value::Str("/chatter".into()),
            Value::Array(vec![Value::Str("std_msgs/String".into())]),
        ]);
        let (method, params) = parse_call(&body).unwrap();
        assert_eq!(method, "registerPublisher");
        assert_eq!(params[0], Value::Str("/node".into()));
        assert_eq!(params[2], Value::Array(vec![Value::Str("std_msgs/String".into())]));
    }

    #[test]
    fn fault_round_trips() {
        let body = encode_fault(-1, "no such service");
        let err = parse_response(&body).unwrap_err();
        assert_eq!(err.code, -1);
        assert_eq!(err.message, "no such service");
    }

    #[test]
    fn strings_escape_reserved_characters() {
        let body = encode_call("m", &[Value::Str("a<b>&c".into())]);
        let (_, params) = parse_call(&body).unwrap();
        assert_eq!(params[0], Value::Str("a<b>&c".into()));
    }
}
