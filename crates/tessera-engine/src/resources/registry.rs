use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResourceKind {
    Buffer,
    Texture,
}

/// A GPU object the registry can destroy once it is safe to.
pub(crate) trait GpuObject {
    fn destroy(self);
}

#[derive(Debug)]
pub(crate) struct Entry<H> {
    pub kind: ResourceKind,
    pub byte_size: u64,
    pub ref_count: u32,
    /// Bumped on every (re)allocation so dependents can spot stale bindings.
    pub generation: u64,
    /// Serial whose completion makes the contents visible to the GPU.
    pub ready_after: u64,
    pub handle: H,
}

#[derive(Debug)]
struct Retired<H> {
    id: String,
    /// Destroy once this serial has completed.
    serial: u64,
    handle: H,
}

/// Id-keyed, reference-counted handle store with deferred destruction.
///
/// Knows nothing about wgpu: callers pass timeline serials in, which keeps
/// the lifetime rules testable without a device.
#[derive(Debug)]
pub(crate) struct Registry<H> {
    entries: HashMap<String, Entry<H>>,
    retired: Vec<Retired<H>>,
    next_generation: u64,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            retired: Vec::new(),
            next_generation: 1,
        }
    }
}

impl<H: GpuObject> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `DuplicateId` if `id` is live. Check before allocating.
    pub fn ensure_vacant(&self, id: &str) -> Result<()> {
        if self.entries.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    /// Registers `handle` with a reference count of one.
    pub fn insert(
        &mut self,
        id: String,
        kind: ResourceKind,
        byte_size: u64,
        ready_after: u64,
        handle: H,
    ) -> Result<u64> {
        self.ensure_vacant(&id)?;
        let generation = self.bump_generation();
        self.entries.insert(
            id,
            Entry {
                kind,
                byte_size,
                ref_count: 1,
                generation,
                ready_after,
                handle,
            },
        );
        Ok(generation)
    }

    pub fn get(&self, id: &str) -> Result<&Entry<H>> {
        self.entries
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn retain(&mut self, id: &str) -> Result<u32> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.ref_count += 1;
        Ok(entry.ref_count)
    }

    /// Drops one reference. At zero the entry leaves the id space and its
    /// handle waits for `serial` to retire. Returns the remaining count.
    pub fn release(&mut self, id: &str, serial: u64) -> Result<u32> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        entry.ref_count = entry.ref_count.saturating_sub(1);
        let remaining = entry.ref_count;

        if remaining == 0 {
            if let Some(entry) = self.entries.remove(id) {
                self.retired.push(Retired {
                    id: id.to_string(),
                    serial,
                    handle: entry.handle,
                });
            }
        }
        Ok(remaining)
    }

    /// Retires every entry regardless of reference count.
    pub fn release_all(&mut self, serial: u64) -> usize {
        let count = self.entries.len();
        for (id, entry) in self.entries.drain() {
            self.retired.push(Retired {
                id,
                serial,
                handle: entry.handle,
            });
        }
        count
    }

    /// Swaps the handle of a live entry; the old one is retired at `serial`.
    pub fn replace(&mut self, id: &str, handle: H, byte_size: u64, serial: u64) -> Result<u64> {
        let generation = self.bump_generation();
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let old = std::mem::replace(&mut entry.handle, handle);
        entry.byte_size = byte_size;
        entry.generation = generation;

        self.retired.push(Retired {
            id: id.to_string(),
            serial,
            handle: old,
        });
        Ok(generation)
    }

    /// Destroys retired handles whose serial is `<= completed`.
    pub fn collect(&mut self, completed: u64) -> usize {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|r| r.serial <= completed);
        self.retired = pending;

        let count = done.len();
        for r in done {
            log::trace!("releasing `{}` (serial {})", r.id, r.serial);
            r.handle.destroy();
        }
        count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.retired.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.byte_size).sum()
    }

    fn bump_generation(&mut self) -> u64 {
        let g = self.next_generation;
        self.next_generation += 1;
        g
    }
}

/// Validates a `len`-byte write at `offset` into a `size`-byte resource and
/// returns the length to copy.
///
/// The offset must be copy-aligned. The length may only be unaligned when the
/// write ends exactly at `size`; it is then rounded up into the allocation's
/// tail padding, so no caller bytes are clobbered.
pub(crate) fn check_write(id: &str, size: u64, offset: u64, len: u64) -> Result<u64> {
    let end = offset.checked_add(len);
    if end.is_none_or(|end| end > size) {
        return Err(Error::OutOfBounds {
            id: id.to_string(),
            offset,
            len,
            size,
        });
    }

    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    let tail = end == Some(size);
    if offset % align != 0 || (len % align != 0 && !tail) {
        return Err(Error::Misaligned {
            id: id.to_string(),
            offset,
            len,
        });
    }
    Ok(len.next_multiple_of(align))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Records destroyed handles by name.
    #[derive(Debug)]
    struct Tracked {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl GpuObject for Tracked {
        fn destroy(self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    fn tracked(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Tracked {
        Tracked {
            name,
            log: log.clone(),
        }
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let log = Rc::default();
        let mut r = Registry::new();
        r.insert("a".into(), ResourceKind::Buffer, 16, 0, tracked(&log, "a1"))
            .unwrap();
        let err = r
            .insert("a".into(), ResourceKind::Buffer, 32, 0, tracked(&log, "a2"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId(_)));
        assert_eq!(r.get("a").unwrap().byte_size, 16);
    }

    #[test]
    fn dispose_ref_count_times_releases() {
        let log = Rc::default();
        let mut r = Registry::new();
        r.insert("tex".into(), ResourceKind::Texture, 64, 1, tracked(&log, "tex"))
            .unwrap();
        assert_eq!(r.retain("tex").unwrap(), 2);
        assert_eq!(r.retain("tex").unwrap(), 3);

        assert_eq!(r.release("tex", 5).unwrap(), 2);
        assert_eq!(r.release("tex", 5).unwrap(), 1);
        assert!(r.contains("tex"));
        assert_eq!(r.release("tex", 5).unwrap(), 0);

        // Gone from the id space immediately.
        assert!(matches!(r.get("tex"), Err(Error::NotFound(_))));
        assert!(matches!(r.retain("tex"), Err(Error::NotFound(_))));
        assert!(matches!(r.release("tex", 6), Err(Error::NotFound(_))));
        assert_eq!(r.pending_len(), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn destruction_waits_for_serial() {
        let log = Rc::default();
        let mut r = Registry::new();
        r.insert("a".into(), ResourceKind::Buffer, 4, 0, tracked(&log, "a"))
            .unwrap();
        r.insert("b".into(), ResourceKind::Buffer, 4, 0, tracked(&log, "b"))
            .unwrap();

        r.release("a", 3).unwrap();
        r.release("b", 4).unwrap();

        assert_eq!(r.collect(2), 0);
        assert_eq!(r.collect(3), 1);
        assert_eq!(*log.borrow(), ["a"]);
        assert_eq!(r.collect(10), 1);
        assert_eq!(*log.borrow(), ["a", "b"]);
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn id_can_be_reused_while_old_handle_is_pending() {
        let log = Rc::default();
        let mut r = Registry::new();
        let g1 = r
            .insert("a".into(), ResourceKind::Buffer, 4, 0, tracked(&log, "old"))
            .unwrap();
        r.release("a", 2).unwrap();
        let g2 = r
            .insert("a".into(), ResourceKind::Buffer, 8, 0, tracked(&log, "new"))
            .unwrap();
        assert_ne!(g1, g2);

        r.collect(2);
        assert_eq!(*log.borrow(), ["old"]);
        assert_eq!(r.get("a").unwrap().byte_size, 8);
    }

    #[test]
    fn replace_retires_old_handle_and_bumps_generation() {
        let log = Rc::default();
        let mut r = Registry::new();
        let g1 = r
            .insert("inst".into(), ResourceKind::Buffer, 64, 0, tracked(&log, "small"))
            .unwrap();
        let g2 = r.replace("inst", tracked(&log, "big"), 128, 7).unwrap();
        assert!(g2 > g1);
        assert_eq!(r.get("inst").unwrap().byte_size, 128);
        assert_eq!(r.get("inst").unwrap().ref_count, 1);

        r.collect(7);
        assert_eq!(*log.borrow(), ["small"]);
        assert!(matches!(
            r.replace("missing", tracked(&log, "x"), 1, 0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn release_all_drains_everything() {
        let log = Rc::default();
        let mut r = Registry::new();
        for name in ["a", "b", "c"] {
            r.insert(name.into(), ResourceKind::Buffer, 4, 0, tracked(&log, name))
                .unwrap();
        }
        r.retain("b").unwrap();
        assert_eq!(r.total_bytes(), 12);

        assert_eq!(r.release_all(1), 3);
        assert_eq!(r.len(), 0);
        assert_eq!(r.collect(1), 3);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn write_bounds() {
        assert_eq!(check_write("b", 16, 0, 16).unwrap(), 16);
        assert_eq!(check_write("b", 16, 12, 4).unwrap(), 4);
        assert!(matches!(check_write("b", 16, 12, 8), Err(Error::OutOfBounds { .. })));
        assert!(matches!(check_write("b", 16, u64::MAX, 4), Err(Error::OutOfBounds { .. })));
        assert!(matches!(check_write("b", 16, 2, 4), Err(Error::Misaligned { .. })));
    }

    #[test]
    fn unaligned_size_bounds_use_requested_length() {
        // A 6-byte buffer is backed by 8 bytes; the extra two are padding.
        assert!(matches!(
            check_write("b6", 6, 4, 4),
            Err(Error::OutOfBounds { size: 6, .. })
        ));
        assert!(matches!(check_write("b6", 6, 0, 8), Err(Error::OutOfBounds { .. })));

        // Writes reaching the end are padded into the tail.
        assert_eq!(check_write("b6", 6, 0, 6).unwrap(), 8);
        assert_eq!(check_write("b6", 6, 4, 2).unwrap(), 4);

        // Unaligned writes that stop short would clobber caller bytes.
        assert!(matches!(check_write("b6", 6, 0, 2), Err(Error::Misaligned { len: 2, .. })));
        assert_eq!(check_write("b6", 6, 0, 4).unwrap(), 4);
    }
}
