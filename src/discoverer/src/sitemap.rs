// Copyright 2026 the crawler authors.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Sitemap-0.9 `<urlset>` parsing. Matches elements by local name only, so a
//! document that declares the sitemap namespace with a prefix, as the
//! default namespace, or not at all is read the same way.

use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

/// One `<url>` entry whose `contentType` contains `schema.org`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaUrl {
    pub loc: String,
    pub content_type: String,
}

fn local_name(tag: &[u8]) -> &[u8] {
    match tag.iter().position(|&b| b == b':') {
        Some(i) => &tag[i + 1..],
        None => tag,
    }
}

/// Parses `xml_content` and returns every `<url>` whose `contentType`
/// attribute contains the case-insensitive substring `schema.org`, with
/// `loc` resolved to an absolute URL against `base_url`.
pub fn parse_schema_map_xml(xml_content: &str, base_url: &str) -> Vec<SchemaUrl> {
    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut results = Vec::new();
    let mut in_url = false;
    let mut current_content_type = String::new();
    let mut in_loc = false;
    let mut current_loc = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if name == b"url" {
                    in_url = true;
                    current_content_type.clear();
                    current_loc.clear();
                    for attr in e.attributes().flatten() {
                        if local_name(attr.key.as_ref()) == b"contentType" {
                            if let Ok(value) = attr.unescape_value() {
                                current_content_type = value.into_owned();
                            }
                        }
                    }
                } else if in_url && name == b"loc" {
                    in_loc = true;
                }
            }
            Ok(Event::Text(t)) => {
                if in_loc {
                    if let Ok(text) = t.unescape() {
                        current_loc.push_str(text.trim());
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if name == b"loc" {
                    in_loc = false;
                } else if name == b"url" {
                    in_url = false;
                    if current_content_type.to_lowercase().contains("schema.org") && !current_loc.is_empty() {
                        if let Ok(resolved) = base.join(&current_loc) {
                            results.push(SchemaUrl {
                                loc: resolved.to_string(),
                                content_type: current_content_type.clone(),
                            });
                        }
                    }
                }
            }
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    results
}
