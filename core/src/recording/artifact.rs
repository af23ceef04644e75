//! Binary recording artifact.
//!
//! Layout (little-endian): `"SGRC"`, `u16` version, `u32` event count, then per event
//! `u8` kind, `u16` name length, name bytes, `u64` start ns, `u64` duration ns.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use super::event::{Event, EventKind};

const MAGIC: &[u8; 4] = b"SGRC";
const VERSION: u16 = 1;

/// Events read back from (or about to be written to) an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recording {
    pub events: Vec<Event>,
}

impl Recording {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn threads(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.events.iter().map(|e| e.thread.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("create recording '{}'", path.display()))?;
        let mut out = BufWriter::new(file);
        self.encode(&mut out)?;
        out.flush().with_context(|| format!("flush recording '{}'", path.display()))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open recording '{}'", path.display()))?;
        Self::decode(&mut BufReader::new(file)).with_context(|| format!("parse recording '{}'", path.display()))
    }

    pub fn encode<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;
        let count = u32::try_from(self.events.len()).context("too many events for one artifact")?;
        out.write_all(&count.to_le_bytes())?;

        for event in &self.events {
            let name = event.thread.as_bytes();
            let name_len = u16::try_from(name.len()).unwrap_or(u16::MAX);
            out.write_all(&[event.kind.code()])?;
            out.write_all(&name_len.to_le_bytes())?;
            out.write_all(&name[..name_len as usize])?;
            out.write_all(&saturating_nanos(event.start).to_le_bytes())?;
            out.write_all(&saturating_nanos(event.duration).to_le_bytes())?;
        }
        Ok(())
    }

    pub fn decode<R: Read>(input: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic).context("missing header")?;
        if &magic != MAGIC {
            bail!("not a recording artifact");
        }
        let version = u16::from_le_bytes(read_array(input)?);
        if version != VERSION {
            bail!("unsupported recording version {}", version);
        }
        let count = u32::from_le_bytes(read_array(input)?) as usize;

        let mut events = Vec::with_capacity(count.min(1 << 16));
        for index in 0..count {
            let [code] = read_array::<1, _>(input)?;
            let kind = EventKind::from_code(code).with_context(|| format!("event {}: unknown kind {}", index, code))?;
            let name_len = u16::from_le_bytes(read_array(input)?) as usize;
            let mut name = vec![0u8; name_len];
            input
                .read_exact(&mut name)
                .with_context(|| format!("event {}: truncated thread name", index))?;
            let thread = String::from_utf8(name).with_context(|| format!("event {}: thread name is not UTF-8", index))?;
            let start = Duration::from_nanos(u64::from_le_bytes(read_array(input)?));
            let duration = Duration::from_nanos(u64::from_le_bytes(read_array(input)?));
            events.push(Event {
                kind,
                thread,
                start,
                duration,
            });
        }
        Ok(Self { events })
    }
}

fn read_array<const N: usize, R: Read>(input: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf).context("unexpected end of recording")?;
    Ok(buf)
}

fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
