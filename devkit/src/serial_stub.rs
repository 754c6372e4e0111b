/*!
Backend série simulé pour développer sans carte branchée

Remplace `SerialBackend` derrière le trait `TransportBackend` :
- liste de ports visibles modifiable à chaud (plug / unplug)
- un script par ouverture de device (échec, silence, lignes puis fermeture)
- enregistre chaque énumération et chaque ouverture pour les assertions

Une découverte ouvre le device pour le sonder, puis l'ingestion le rouvre :
chaque ouverture consomme une entrée du script, la dernière se répète.
*/

use airnalyzer_bridge::models::TransportCandidate;
use airnalyzer_bridge::transport::{TransportBackend, TransportError, TransportLink};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Idle links sleep this long per empty read instead of spinning.
const IDLE_POLL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
pub enum DeviceScript {
    /// `open` fails as if the cable had been pulled.
    Unplugged,
    /// Opens fine, never sends a byte.
    Silent,
    /// Sends these lines, then the device closes the stream.
    Lines(Vec<String>),
    /// Sends these lines, then the read fails.
    LinesThenFail(Vec<String>),
}

impl DeviceScript {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DeviceScript::Lines(lines.into_iter().map(Into::into).collect())
    }
}

#[derive(Default)]
struct MockState {
    visible: Vec<TransportCandidate>,
    scripts: HashMap<String, VecDeque<DeviceScript>>,
    enumerations: usize,
    opened: Vec<String>,
    enumeration_fails: bool,
}

#[derive(Clone, Default)]
pub struct MockSerialBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `plug` + `script`.
    pub fn with_port(self, device: &str, description: &str, hwid: &str, script: DeviceScript) -> Self {
        self.plug(device, description, hwid);
        self.script(device, [script]);
        self
    }

    /// Makes a device visible to enumeration.
    pub fn plug(&self, device: &str, description: &str, hwid: &str) {
        let mut state = self.state.lock().unwrap();
        state.visible.retain(|c| c.device != device);
        state.visible.push(TransportCandidate {
            device: device.to_string(),
            description: description.to_string(),
            hwid: hwid.to_string(),
        });
        log::info!("🔌 [MOCK] plugged {}", device);
    }

    pub fn unplug(&self, device: &str) {
        self.state.lock().unwrap().visible.retain(|c| c.device != device);
        log::info!("🔌 [MOCK] unplugged {}", device);
    }

    /// Queues behaviours for the next opens of `device`. Works for devices that
    /// are never enumerated too (forced device).
    pub fn script<I>(&self, device: &str, scripts: I)
    where
        I: IntoIterator<Item = DeviceScript>,
    {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(device.to_string())
            .or_default()
            .extend(scripts);
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state.lock().unwrap().enumeration_fails = fail;
    }

    pub fn enumerations(&self) -> usize {
        self.state.lock().unwrap().enumerations
    }

    /// Every `open` call so far, in order, successful or not.
    pub fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn open_count(&self, device: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .opened
            .iter()
            .filter(|d| d.as_str() == device)
            .count()
    }

    fn next_script(&self, device: &str) -> DeviceScript {
        let mut state = self.state.lock().unwrap();
        state.opened.push(device.to_string());
        match state.scripts.get_mut(device) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(DeviceScript::Unplugged),
            Some(queue) => queue.front().cloned().unwrap_or(DeviceScript::Unplugged),
            None => DeviceScript::Unplugged,
        }
    }
}

impl TransportBackend for MockSerialBackend {
    fn enumerate(&self) -> Result<Vec<TransportCandidate>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.enumerations += 1;
        if state.enumeration_fails {
            return Err(TransportError::Enumerate(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "mock enumeration failure",
            )));
        }
        Ok(state.visible.clone())
    }

    fn open(&self, device: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        let link = match self.next_script(device) {
            DeviceScript::Unplugged => {
                return Err(TransportError::Open {
                    device: device.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
                })
            }
            DeviceScript::Silent => MockLink::new(Vec::new(), LinkEnd::Idle),
            DeviceScript::Lines(lines) => MockLink::new(lines, LinkEnd::Closed),
            DeviceScript::LinesThenFail(lines) => MockLink::new(lines, LinkEnd::Fail),
        };
        log::debug!("[MOCK] opened {}", device);
        Ok(Box::new(link))
    }
}

#[derive(Debug, Clone, Copy)]
enum LinkEnd {
    Idle,
    Closed,
    Fail,
}

pub struct MockLink {
    pending: VecDeque<Vec<u8>>,
    end: LinkEnd,
}

impl MockLink {
    fn new(lines: Vec<String>, end: LinkEnd) -> Self {
        let pending = lines
            .into_iter()
            .map(|line| {
                let mut bytes = line.into_bytes();
                if bytes.last() != Some(&b'\n') {
                    bytes.push(b'\n');
                }
                bytes
            })
            .collect();
        Self { pending, end }
    }
}

impl TransportLink for MockLink {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(line));
        }
        match self.end {
            LinkEnd::Idle => {
                thread::sleep(IDLE_POLL);
                Ok(None)
            }
            LinkEnd::Closed => Err(TransportError::Closed),
            LinkEnd::Fail => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device disconnected",
            ))),
        }
    }

    fn has_data_within(&mut self, _window: Duration) -> Result<bool, TransportError> {
        Ok(!self.pending.is_empty())
    }
}
