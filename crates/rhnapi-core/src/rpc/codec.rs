//! XML-RPC request encoding and response decoding.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::Value;
use crate::dates;
use crate::error::{Error, Result};

/// Encode a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        encode_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>\n");
    xml
}

/// Encode a successful `methodResponse`, as a server would.
#[cfg(test)]
pub(crate) fn encode_response(value: &Value) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<methodResponse><params><param>");
    encode_value(&mut xml, value);
    xml.push_str("</param></params></methodResponse>\n");
    xml
}

/// Encode a fault `methodResponse`, as a server would.
#[cfg(test)]
pub(crate) fn encode_fault(code: i32, message: &str) -> String {
    let mut members = BTreeMap::new();
    members.insert("faultCode".to_string(), Value::Int(code));
    members.insert("faultString".to_string(), Value::from(message));

    let mut xml = String::from("<?xml version=\"1.0\"?>\n<methodResponse><fault>");
    encode_value(&mut xml, &Value::Struct(members));
    xml.push_str("</fault></methodResponse>\n");
    xml
}

fn encode_value(xml: &mut String, value: &Value) {
    xml.push_str("<value>");
    match value {
        Value::Int(i) => {
            let _ = write!(xml, "<int>{}</int>", i);
        }
        Value::Long(i) => {
            let _ = write!(xml, "<i8>{}</i8>", i);
        }
        Value::Boolean(b) => {
            let _ = write!(xml, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::String(s) => {
            let _ = write!(xml, "<string>{}</string>", escape(s.as_str()));
        }
        Value::Double(d) => {
            let _ = write!(xml, "<double>{}</double>", d);
        }
        Value::DateTime(dt) => {
            let _ = write!(
                xml,
                "<dateTime.iso8601>{}</dateTime.iso8601>",
                dates::format_iso8601(dt)
            );
        }
        Value::Base64(bytes) => {
            let _ = write!(xml, "<base64>{}</base64>", STANDARD.encode(bytes));
        }
        Value::Array(items) => {
            xml.push_str("<array><data>");
            for item in items {
                encode_value(xml, item);
            }
            xml.push_str("</data></array>");
        }
        Value::Struct(members) => {
            xml.push_str("<struct>");
            for (name, member) in members {
                let _ = write!(xml, "<member><name>{}</name>", escape(name.as_str()));
                encode_value(xml, member);
                xml.push_str("</member>");
            }
            xml.push_str("</struct>");
        }
        Value::Nil => xml.push_str("<nil/>"),
    }
    xml.push_str("</value>");
}

/// Minimal element tree built from the response before it is interpreted.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn expect_child(&self, name: &str) -> Result<&Element> {
        self.child(name)
            .ok_or_else(|| Error::Parse(format!("<{}> has no <{}> element", self.name, name)))
    }
}

fn parse_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::Parse(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(start) => {
                stack.push(Element {
                    name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                    ..Element::default()
                });
            }
            Event::Empty(start) => {
                let element = Element {
                    name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                    ..Element::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Parse("unbalanced closing tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped = text.unescape().map_err(|e| Error::Parse(e.to_string()))?;
                    current.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::Parse("document ended inside an element".to_string()));
    }
    root.ok_or_else(|| Error::Parse("empty document".to_string()))
}

/// Decode a `methodResponse` document. A `<fault>` becomes `Error::Fault`.
pub fn decode_response(xml: &str) -> Result<Value> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(Error::Parse(format!(
            "expected <methodResponse>, found <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let value = decode_value(fault.expect_child("value")?)?;
        let code = value
            .get("faultCode")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or_default();
        let message = value
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(Error::Fault { code, message });
    }

    let params = root.expect_child("params")?;
    match params.child("param") {
        Some(param) => decode_value(param.expect_child("value")?),
        None => Ok(Value::Nil),
    }
}

fn decode_value(value: &Element) -> Result<Value> {
    let Some(typed) = value.children.first() else {
        // untyped <value>text</value> is a string
        return Ok(Value::String(value.text.clone()));
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "int" | "i4" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| Error::Parse(format!("bad <{}> value {:?}", typed.name, text))),
        "i8" => text
            .parse()
            .map(Value::Long)
            .map_err(|_| Error::Parse(format!("bad <i8> value {:?}", text))),
        "boolean" => match text {
            "1" => Ok(Value::Boolean(true)),
            "0" => Ok(Value::Boolean(false)),
            _ => Err(Error::Parse(format!("bad <boolean> value {:?}", text))),
        },
        "string" => Ok(Value::String(typed.text.clone())),
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| Error::Parse(format!("bad <double> value {:?}", text))),
        "dateTime.iso8601" => NaiveDateTime::parse_from_str(text, dates::ISO8601_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
            .map(Value::DateTime)
            .map_err(|_| Error::Parse(format!("bad <dateTime.iso8601> value {:?}", text))),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Base64)
                .map_err(|e| Error::Parse(format!("bad <base64> value: {}", e)))
        }
        "nil" => Ok(Value::Nil),
        "array" => {
            let data = typed.expect_child("data")?;
            data.children
                .iter()
                .filter(|c| c.name == "value")
                .map(decode_value)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.expect_child("name")?.text.clone();
                let value = decode_value(member.expect_child("value")?)?;
                members.insert(name, value);
            }
            Ok(Value::Struct(members))
        }
        other => Err(Error::Parse(format!("unknown value type <{}>", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(inner: &str) -> String {
        format!(
            "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n{}\n</param>\n</params>\n</methodResponse>",
            inner
        )
    }

    #[test]
    fn test_encode_call_escapes_strings() {
        let xml = encode_call(
            "auth.login",
            &[Value::from("alice"), Value::from("p<&>w"), Value::Int(3600)],
        );
        assert!(xml.contains("<methodName>auth.login</methodName>"));
        assert!(xml.contains("<param><value><string>alice</string></value></param>"));
        assert!(xml.contains("<string>p&lt;&amp;&gt;w</string>"));
        assert!(xml.contains("<int>3600</int>"));
    }

    #[test]
    fn test_encode_nested_values() {
        let mut members = BTreeMap::new();
        members.insert("ids".to_string(), Value::from(vec![1, 2]));
        members.insert("when".to_string(), dates::to_rpc("2024-05-01").unwrap());
        let xml = encode_call("system.schedule", &[Value::Struct(members), Value::Nil]);
        assert!(xml.contains(
            "<struct><member><name>ids</name><value><array><data>\
             <value><int>1</int></value><value><int>2</int></value>\
             </data></array></value></member>"
        ));
        assert!(xml.contains("<dateTime.iso8601>20240501T00:00:00</dateTime.iso8601>"));
        assert!(xml.contains("<value><nil/></value>"));
    }

    #[test]
    fn test_decode_untyped_string() {
        let value = decode_response(&response("<value>5x7zabc</value>")).unwrap();
        assert_eq!(value, Value::from("5x7zabc"));
    }

    #[test]
    fn test_decode_struct_array() {
        let xml = response(
            "<value><array><data>\
               <value><struct>\
                 <member><name>id</name><value><i4>1000010001</i4></value></member>\
                 <member><name>name</name><value><string>web &amp; db</string></value></member>\
                 <member><name>last_checkin</name><value><dateTime.iso8601>20240102T03:04:05</dateTime.iso8601></value></member>\
               </struct></value>\
               <value><boolean>1</boolean></value>\
             </data></array></value>",
        );
        let value = decode_response(&xml).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("id").and_then(Value::as_i64), Some(1000010001));
        assert_eq!(items[0].get("name").and_then(Value::as_str), Some("web & db"));
        assert_eq!(
            items[0].get("last_checkin"),
            Some(&Value::DateTime(dates::parse_date("2024-01-02 03:04:05").unwrap()))
        );
        assert_eq!(items[1], Value::Boolean(true));
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        let value = decode_response(&response("<value><base64>aGVs\nbG8=</base64></value>")).unwrap();
        assert_eq!(value, Value::Base64(b"hello".to_vec()));
    }

    #[test]
    fn test_decode_fault() {
        let xml = "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
                   <member><name>faultCode</name><value><int>2950</int></value></member>\
                   <member><name>faultString</name><value><string>Either the password or username is incorrect.</string></value></member>\
                   </struct></value></fault></methodResponse>";
        match decode_response(xml) {
            Err(Error::Fault { code, message }) => {
                assert_eq!(code, 2950);
                assert_eq!(message, "Either the password or username is incorrect.");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_what_server_encodes() {
        let mut members = BTreeMap::new();
        members.insert("label".to_string(), Value::from("rhel-x86_64-server-9"));
        members.insert("packages".to_string(), Value::Long(12_000_000_000));
        members.insert("parent".to_string(), Value::Nil);
        let value = Value::Struct(members);

        assert_eq!(decode_response(&encode_response(&value)).unwrap(), value);
        assert!(matches!(
            decode_response(&encode_fault(-1, "bad <input>")),
            Err(Error::Fault { code: -1, ref message }) if message == "bad <input>"
        ));
    }

    #[test]
    fn test_decode_rejects_non_response() {
        assert!(matches!(
            decode_response("<html><body>proxy error</body></html>"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(decode_response(""), Err(Error::Parse(_))));
        assert!(matches!(
            decode_response(&response("<value><int>abc</int></value>")),
            Err(Error::Parse(_))
        ));
    }
}
