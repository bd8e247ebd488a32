//! FUSE protocol adapter.
//!
//! Maps kernel callbacks onto a [`VirtualFileSystem`]. The callback logic
//! lives in plain methods returning `Result<_, libc::c_int>`; the
//! `fuser::Filesystem` impl only forwards to them and replies.

use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request,
};
use libc::c_int;
use tracing::{debug, trace, warn};

use super::inode::{InodeTable, ROOT_INODE};
use crate::catalog::{Entry, EntryKind};
use crate::vfs::{ReadError, VirtualFileSystem};

const BLOCK_SIZE: u32 = 512;

/// FUSE filesystem serving one engine.
pub struct McrawFuse {
    engine: Arc<dyn VirtualFileSystem>,
    inodes: InodeTable,
    next_handle: AtomicU64,
    attr_ttl: Duration,
    mounted_at: SystemTime,
    uid: u32,
    gid: u32,
}

impl McrawFuse {
    pub fn new(engine: Arc<dyn VirtualFileSystem>, attr_ttl: Duration) -> Self {
        Self {
            engine,
            inodes: InodeTable::new(),
            next_handle: AtomicU64::new(1),
            attr_ttl,
            mounted_at: SystemTime::now(),
            // SAFETY: getuid/getgid cannot fail
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    fn root_attr(&self) -> FileAttr {
        self.make_attr(ROOT_INODE, FileType::Directory, 0, 0o755, 2)
    }

    fn entry_attr(&self, entry: &Entry) -> FileAttr {
        let ino = self.inodes.inode_for(&entry.name);
        match entry.kind {
            EntryKind::File => self.make_attr(ino, FileType::RegularFile, entry.size, 0o644, 1),
            EntryKind::Directory => self.make_attr(ino, FileType::Directory, 0, 0o755, 2),
        }
    }

    fn make_attr(&self, ino: u64, kind: FileType, size: u64, perm: u16, nlink: u32) -> FileAttr {
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(BLOCK_SIZE as u64),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Current entry behind `ino`.
    fn resolve(&self, ino: u64) -> Result<Entry, c_int> {
        let name = self.inodes.name_of(ino).ok_or(libc::ENOENT)?;
        self.engine.find_entry(&name).ok_or(libc::ENOENT)
    }

    pub fn lookup_entry(&self, parent: u64, name: &str) -> Result<FileAttr, c_int> {
        if parent != ROOT_INODE {
            return Err(libc::ENOENT);
        }
        let entry = self.engine.find_entry(name).ok_or(libc::ENOENT)?;
        Ok(self.entry_attr(&entry))
    }

    pub fn attr(&self, ino: u64) -> Result<FileAttr, c_int> {
        if ino == ROOT_INODE {
            return Ok(self.root_attr());
        }
        let entry = self.resolve(ino)?;
        Ok(self.entry_attr(&entry))
    }

    /// Listing of the root: `.`, `..`, then every entry.
    pub fn list_dir(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>, c_int> {
        if ino != ROOT_INODE {
            return Err(libc::ENOENT);
        }
        let mut listing = vec![
            (ROOT_INODE, FileType::Directory, ".".to_string()),
            (ROOT_INODE, FileType::Directory, "..".to_string()),
        ];
        for entry in self.engine.list_files() {
            let kind = match entry.kind {
                EntryKind::File => FileType::RegularFile,
                EntryKind::Directory => FileType::Directory,
            };
            listing.push((self.inodes.inode_for(&entry.name), kind, entry.name));
        }
        Ok(listing)
    }

    /// Validate read-only access and allocate a file handle.
    pub fn open_file(&self, ino: u64, flags: i32) -> Result<u64, c_int> {
        if ino == ROOT_INODE {
            return Err(libc::EISDIR);
        }
        self.resolve(ino)?;
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(libc::EACCES);
        }
        Ok(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Blocking read; runs on the FUSE loop thread.
    pub fn read_file(&self, ino: u64, offset: i64, size: u32) -> Result<Bytes, c_int> {
        if offset < 0 {
            return Err(libc::EINVAL);
        }
        let entry = self.resolve(ino)?;
        self.engine
            .read_file(&entry, offset as u64, size as usize)
            .map_err(|err| match err {
                ReadError::NotFound(_) => libc::ENOENT,
                other => {
                    warn!(entry = %entry.name, offset, size, error = %other, "Read failed");
                    libc::EIO
                }
            })
    }
}

impl Filesystem for McrawFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&self.attr_ttl, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.attr(ino) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(code) => reply.error(code),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let listing = match self.list_dir(ino) {
            Ok(listing) => listing,
            Err(code) => {
                reply.error(code);
                return;
            }
        };

        for (i, (entry_ino, kind, name)) in listing.iter().enumerate().skip(offset.max(0) as usize)
        {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_file(ino, flags) {
            Ok(fh) => {
                trace!(ino, fh, "Opened");
                reply.opened(fh, 0)
            }
            Err(code) => reply.error(code),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_file(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(code) => reply.error(code),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!(ino, fh, "Released");
        reply.ok();
    }
}
