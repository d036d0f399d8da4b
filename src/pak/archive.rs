#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::pak::build::{slots_with, write_pak, Slot};
use crate::pak::error::{PakError, PakResult};
use crate::pak::format::{is_gzipped, Alias, PakVersion, ResourceEntry, ResourceInfo, SENTINEL_ID};
use crate::pak::read::read_tables;

/// An owned, parsed data pack.
///
/// The archive is one byte buffer plus its resource table; an id -> slot map
/// built at parse time makes lookups O(1). Mutations never patch offsets in
/// place: they rebuild the whole buffer in a single forward pass and swap it in.
#[derive(Debug, Clone)]
pub struct PakArchive {
    version: PakVersion,
    encoding: u8,
    entries: Vec<ResourceEntry>,
    aliases: Vec<Alias>,
    index: HashMap<u16, usize>,
    /// alias id -> target slot
    alias_index: HashMap<u16, usize>,
    raw: Vec<u8>,
}

impl PakArchive {
    pub fn parse(raw: Vec<u8>) -> PakResult<Self> {
        let tables = read_tables(&raw)?;
        let real = tables.entries.len() - 1;
        let index: HashMap<u16, usize> = tables.entries[..real]
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        let alias_index = tables
            .aliases
            .iter()
            .map(|a| (a.id, a.target_index as usize))
            .collect();

        Ok(Self {
            version: tables.version,
            encoding: tables.encoding,
            entries: tables.entries,
            aliases: tables.aliases,
            index,
            alias_index,
            raw,
        })
    }

    /// Builds a fresh archive from `(id, bytes)` pairs in table order.
    pub fn from_resources(
        version: PakVersion,
        encoding: u8,
        resources: &[(u16, Vec<u8>)],
        aliases: &[Alias],
    ) -> PakResult<Self> {
        let slots: Vec<Slot<'_>> = resources
            .iter()
            .map(|(id, bytes)| Slot {
                id: *id,
                bytes: bytes.as_slice(),
            })
            .collect();
        let (raw, _) = write_pak(version, encoding, &slots, SENTINEL_ID, aliases)?;
        Self::parse(raw)
    }

    pub fn version(&self) -> PakVersion {
        self.version
    }

    pub fn encoding(&self) -> u8 {
        self.encoding
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Number of real resources (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resource ids in table order.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries[..self.len()].iter().map(|e| e.id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.index.contains_key(&id)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    pub fn resources(&self) -> Vec<ResourceInfo> {
        (0..self.len())
            .map(|i| {
                let bytes = self.slot_bytes(i);
                ResourceInfo {
                    id: self.entries[i].id,
                    offset: self.entries[i].offset,
                    len: bytes.len(),
                    gzipped: is_gzipped(bytes),
                }
            })
            .collect()
    }

    /// Bytes of resource `id`, following a v5 alias when `id` is not itself
    /// in the resource table.
    pub fn get(&self, id: u16) -> Option<&[u8]> {
        if let Some(&i) = self.index.get(&id) {
            return Some(self.slot_bytes(i));
        }
        self.alias_index.get(&id).map(|&i| self.slot_bytes(i))
    }

    fn slot_bytes(&self, i: usize) -> &[u8] {
        let start = self.entries[i].offset as usize;
        let end = self.entries[i + 1].offset as usize;
        &self.raw[start..end]
    }

    /// Serializes the archive with its current contents.
    pub fn write(&self) -> PakResult<Vec<u8>> {
        self.write_with_modifications(&HashMap::new())
    }

    /// Serializes the archive with `mods` substituted for the matching
    /// resources. All modifications are applied in the same pass.
    pub fn write_with_modifications(&self, mods: &HashMap<u16, Vec<u8>>) -> PakResult<Vec<u8>> {
        Ok(self.rebuild(mods)?.0)
    }

    /// Replaces every resource named in `mods` and swaps in the rebuilt buffer.
    pub fn apply(&mut self, mods: &HashMap<u16, Vec<u8>>) -> PakResult<()> {
        if mods.is_empty() {
            return Ok(());
        }
        let (raw, entries) = self.rebuild(mods)?;
        self.raw = raw;
        self.entries = entries;
        Ok(())
    }

    pub fn set_resource(&mut self, id: u16, bytes: Vec<u8>) -> PakResult<()> {
        let mut mods = HashMap::with_capacity(1);
        mods.insert(id, bytes);
        self.apply(&mods)
    }

    fn rebuild(&self, mods: &HashMap<u16, Vec<u8>>) -> PakResult<(Vec<u8>, Vec<ResourceEntry>)> {
        if let Some(id) = mods.keys().find(|id| !self.index.contains_key(id)) {
            return Err(PakError::UnknownResource(*id));
        }
        let slots = slots_with(&self.raw, &self.entries, mods);
        let sentinel_id = self.entries[self.len()].id;
        write_pak(self.version, self.encoding, &slots, sentinel_id, &self.aliases)
    }
}
