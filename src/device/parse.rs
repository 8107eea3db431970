//! Parsers for adb and device shell output

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use super::ProcessStatus;

/// A device as listed by `adb devices`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeviceEntry {
    pub serial: String,
    /// "device", "offline", "unauthorized", ...
    pub state: String,
}

impl DeviceEntry {
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// Parse `adb devices` output
pub fn parse_devices(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(DeviceEntry {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Parse `ps` output into a process status map
///
/// The PID column is located through the header; the process name is always
/// the last column, both for `ps -A -o PID,NAME` and for legacy toolbox `ps`.
pub fn parse_process_status(output: &str) -> ProcessStatus {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let mut status = ProcessStatus::new();

    let pid_column = match lines
        .next()
        .and_then(|header| header.split_whitespace().position(|c| c == "PID"))
    {
        Some(idx) => idx,
        None => return status,
    };

    for line in lines {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() <= pid_column {
            continue;
        }
        let (Ok(pid), Some(name)) = (columns[pid_column].parse::<u32>(), columns.last()) else {
            continue;
        };
        status.insert(*name, pid);
    }

    status
}

/// Parse `pm list packages` output
pub fn parse_package_list(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parse `wm size` output into (width, height)
///
/// An override size wins over the physical size.
pub fn parse_screen_size(output: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    let mut overridden = None;
    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let Some((w, h)) = value.trim().split_once('x') else {
            continue;
        };
        let (Ok(w), Ok(h)) = (w.trim().parse(), h.trim().parse()) else {
            continue;
        };
        if label.contains("Override") {
            overridden = Some((w, h));
        } else if label.contains("Physical") {
            physical = Some((w, h));
        }
    }
    overridden.or(physical)
}

/// A node of a uiautomator hierarchy dump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiNode {
    pub attributes: BTreeMap<String, String>,
}

impl UiNode {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Centre of the node's `bounds` attribute (`[x1,y1][x2,y2]`)
    pub fn center(&self) -> Option<(u32, u32)> {
        let (x1, y1, x2, y2) = parse_bounds(self.get("bounds")?)?;
        Some(((x1 + x2) / 2, (y1 + y2) / 2))
    }
}

fn node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<node\b([^>]*?)/?>").expect("valid node regex"))
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([\w:-]+)="([^"]*)""#).expect("valid attribute regex"))
}

/// Parse every `<node>` of a uiautomator XML dump, in document order
pub fn parse_ui_nodes(xml: &str) -> Vec<UiNode> {
    node_regex()
        .captures_iter(xml)
        .map(|node| {
            let attributes = attribute_regex()
                .captures_iter(&node[1])
                .map(|attr| (attr[1].to_string(), unescape_xml(&attr[2])))
                .collect();
            UiNode { attributes }
        })
        .collect()
}

fn parse_bounds(bounds: &str) -> Option<(u32, u32, u32, u32)> {
    let numbers: Vec<u32> = bounds
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match numbers.as_slice() {
        [x1, y1, x2, y2] => Some((*x1, *y1, *x2, *y2)),
        _ => None,
    }
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let output = "* daemon started successfully *\nList of devices attached\n\
                      0123456789ABCDEF\tdevice\nemulator-5554\toffline\n\n";
        let devices = parse_devices(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "0123456789ABCDEF");
        assert!(devices[0].is_ready());
        assert!(!devices[1].is_ready());
    }

    #[test]
    fn test_parse_toybox_ps() {
        let output = concat!(
            "  PID NAME\n",
            "    1 init\n",
            "  812 com.twitter.android\n",
            "  990 com.android.chrome\n",
            " 1001 com.android.chrome:sandboxed_process0\n"
        );
        let status = parse_process_status(output);
        assert_eq!(status.pids("init"), &[1]);
        assert_eq!(status.pids("com.twitter.android"), &[812]);
        assert_eq!(status.pids("com.android.chrome"), &[990]);
        assert_eq!(
            status.pids("com.android.chrome:sandboxed_process0"),
            &[1001]
        );
    }

    #[test]
    fn test_parse_legacy_ps() {
        let output = "USER     PID   PPID  VSIZE  RSS     WCHAN    PC        NAME\n\
                      root      1     0     8904   788   ffffffff 00000000 S /init\n\
                      u0_a62    2345  190   1000   200   ffffffff 00000000 S com.twitter.android\n";
        let status = parse_process_status(output);
        assert_eq!(status.pids("/init"), &[1]);
        assert_eq!(status.pids("com.twitter.android"), &[2345]);
    }

    #[test]
    fn test_parse_ps_without_header() {
        assert!(parse_process_status("ps: bad -A\n").is_empty());
    }

    #[test]
    fn test_parse_package_list() {
        let output = "package:com.android.chrome\npackage:org.chromium.chrome\r\n\nnoise\n";
        let packages = parse_package_list(output);
        assert_eq!(packages.len(), 2);
        assert!(packages.contains("com.android.chrome"));
        assert!(packages.contains("org.chromium.chrome"));
    }

    #[test]
    fn test_parse_screen_size_prefers_override() {
        assert_eq!(parse_screen_size("Physical size: 1080x1920\n"), Some((1080, 1920)));
        assert_eq!(
            parse_screen_size("Physical size: 1440x2560\nOverride size: 1080x1920\n"),
            Some((1080, 1920))
        );
        assert_eq!(parse_screen_size("garbage"), None);
    }

    #[test]
    fn test_parse_ui_nodes() {
        let xml = concat!(
            r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>"#,
            r#"<hierarchy rotation="0">"#,
            r#"<node index="0" text="" class="android.widget.FrameLayout" "#,
            r#"package="com.twitter.android" bounds="[0,0][1080,1920]">"#,
            r#"<node index="1" text="flipkart.com &amp; more" class="android.widget.TextView" "#,
            r#"package="com.twitter.android" bounds="[100,200][300,260]" />"#,
            r#"</node></hierarchy>"#
        );
        let nodes = parse_ui_nodes(xml);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].get("text"), Some("flipkart.com & more"));
        assert_eq!(nodes[1].get("class"), Some("android.widget.TextView"));
        assert_eq!(nodes[1].center(), Some((200, 230)));
    }
}
