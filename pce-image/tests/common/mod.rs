//! Tar fixtures with full control over header fields
//!
//! `tar::Builder` refuses absolute names and `..` components, so hostile
//! names are written straight into the header.

#![allow(dead_code)]

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};

pub struct TarFixture {
    builder: tar::Builder<Vec<u8>>,
}

impl TarFixture {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    fn header(name: &str, kind: EntryType, size: u64, link: Option<&str>) -> Header {
        let mut header = Header::new_gnu();
        {
            let old = header.as_old_mut();
            old.name[..name.len()].copy_from_slice(name.as_bytes());
            if let Some(link) = link {
                old.linkname[..link.len()].copy_from_slice(link.as_bytes());
            }
        }
        header.set_entry_type(kind);
        header.set_size(size);
        header.set_mode(0o644);
        header.set_cksum();
        header
    }

    fn push(mut self, name: &str, kind: EntryType, data: &[u8], link: Option<&str>) -> Self {
        let header = Self::header(name, kind, data.len() as u64, link);
        self.builder.append(&header, data).unwrap();
        self
    }

    pub fn dir(self, name: &str) -> Self {
        self.push(name, EntryType::Directory, &[], None)
    }

    pub fn file(self, name: &str, contents: &[u8]) -> Self {
        self.push(name, EntryType::Regular, contents, None)
    }

    pub fn symlink(self, name: &str, target: &str) -> Self {
        self.push(name, EntryType::Symlink, &[], Some(target))
    }

    pub fn hardlink(self, name: &str, target: &str) -> Self {
        self.push(name, EntryType::Link, &[], Some(target))
    }

    pub fn special(self, name: &str, kind: EntryType) -> Self {
        self.push(name, kind, &[], None)
    }

    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }

    pub fn build_gzip(self) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.build()).unwrap();
        encoder.finish().unwrap()
    }
}

pub fn entry_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
