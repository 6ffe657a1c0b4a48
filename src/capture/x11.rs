use std::ops::ControlFlow;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::record::{self, ConnectionExt as _};
use x11rb::protocol::xproto;
use x11rb::rust_connection::RustConnection;
use x11rb::x11_utils::TryParse;

use super::KeySource;
use crate::keymap::KeyDecoder;
use crate::playback::backends::x11::x11_to_evdev_keycode;

// Categories of an EnableContext reply.
const RECORD_FROM_SERVER: u8 = 0;
const RECORD_END_OF_DATA: u8 = 5;

const X11_EVENT_LEN: usize = 32;

/// Global key capture through the RECORD extension.
///
/// Needs two connections: once a context is enabled, the data connection only
/// streams replies, so disabling it has to go through the control connection.
pub struct X11KeySource {
    ctrl: RustConnection,
    data: RustConnection,
}

impl X11KeySource {
    pub fn connect() -> Result<Self> {
        let (ctrl, _) = x11rb::connect(None).context("failed to connect to X11")?;
        let (data, _) = x11rb::connect(None).context("failed to open X11 data connection")?;

        let ext = ctrl
            .extension_information(record::X11_EXTENSION_NAME)
            .context("failed to query X11 extension info")?;
        if ext.is_none() {
            return Err(anyhow!(
                "keystroke capture requires the RECORD extension (not present on this X server)"
            ));
        }

        Ok(Self { ctrl, data })
    }

    fn create_context(&self) -> Result<RecordContext<'_>> {
        let id = self
            .ctrl
            .generate_id()
            .context("failed to allocate a RECORD context id")?;

        let empty = record::Range8 { first: 0, last: 0 };
        let empty_ext = record::ExtRange {
            major: empty,
            minor: record::Range16 { first: 0, last: 0 },
        };
        let range = record::Range {
            core_requests: empty,
            core_replies: empty,
            ext_requests: empty_ext,
            ext_replies: empty_ext,
            delivered_events: empty,
            device_events: record::Range8 {
                first: xproto::KEY_PRESS_EVENT,
                last: xproto::KEY_RELEASE_EVENT,
            },
            errors: empty,
            client_started: false,
            client_died: false,
        };

        self.ctrl
            .record_create_context(id, 0, &[record::CS::ALL_CLIENTS.into()], &[range])
            .context("failed to send RECORD CreateContext")?
            .check()
            .context("X server rejected RECORD CreateContext")?;

        debug!(context = id, "RECORD context created");
        Ok(RecordContext {
            conn: &self.ctrl,
            id,
        })
    }
}

impl KeySource for X11KeySource {
    fn run(self: Box<Self>, on_key: &mut dyn FnMut(String) -> ControlFlow<()>) -> Result<()> {
        let mut decoder = KeyDecoder::us_qwerty()?;
        let context = self.create_context()?;

        let replies = self
            .data
            .record_enable_context(context.id)
            .context("failed to enable RECORD context")?;

        for reply in replies {
            let reply = reply.context("RECORD stream failed")?;
            match reply.category {
                RECORD_FROM_SERVER if reply.client_swapped => {
                    warn!("ignoring RECORD data from a byte-swapped client");
                }
                RECORD_FROM_SERVER => {
                    for (keycode, pressed) in key_transitions(&reply.data) {
                        let evdev = x11_to_evdev_keycode(keycode);
                        if let Some(name) = decoder.key_event(evdev, pressed) {
                            if on_key(name).is_break() {
                                return Ok(());
                            }
                        }
                    }
                }
                RECORD_END_OF_DATA => break,
                _ => {}
            }
        }

        Ok(())
    }
}

/// Disables and frees the RECORD context on drop.
struct RecordContext<'a> {
    conn: &'a RustConnection,
    id: record::Context,
}

impl Drop for RecordContext<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.conn.record_disable_context(self.id) {
            warn!(%err, "failed to disable RECORD context");
        }
        if let Err(err) = self.conn.record_free_context(self.id) {
            warn!(%err, "failed to free RECORD context");
        }
        let _ = self.conn.flush();
        debug!(context = self.id, "RECORD context released");
    }
}

/// Key press/release transitions in a chunk of raw RECORD event data.
fn key_transitions(mut data: &[u8]) -> Vec<(u8, bool)> {
    let mut out = Vec::new();
    while data.len() >= X11_EVENT_LEN {
        let (event, rest) = data.split_at(X11_EVENT_LEN);
        data = rest;

        let kind = event[0] & 0x7f;
        if kind != xproto::KEY_PRESS_EVENT && kind != xproto::KEY_RELEASE_EVENT {
            continue;
        }
        if let Ok((parsed, _)) = xproto::KeyPressEvent::try_parse(event) {
            out.push((parsed.detail, kind == xproto::KEY_PRESS_EVENT));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(kind: u8, detail: u8) -> [u8; X11_EVENT_LEN] {
        let mut event = [0u8; X11_EVENT_LEN];
        event[0] = kind;
        event[1] = detail;
        event
    }

    #[test]
    fn key_transitions_skip_other_events() {
        let mut data = Vec::new();
        data.extend_from_slice(&raw_event(xproto::KEY_PRESS_EVENT, 38));
        data.extend_from_slice(&raw_event(xproto::MOTION_NOTIFY_EVENT, 0));
        // Synthetic bit set.
        data.extend_from_slice(&raw_event(xproto::KEY_RELEASE_EVENT | 0x80, 38));
        data.extend_from_slice(&[0u8; 7]);

        assert_eq!(key_transitions(&data), vec![(38, true), (38, false)]);
    }
}
