//! Container dispatch.
//!
//! [`Container`] ties the pieces together: sniff a buffer, parse it with the
//! matching format reader, and expose a uniform surface — named entries,
//! entry bytes, per-object decode — that a UI or export layer can drive
//! without knowing any format's field layout. Nested containers (bundle
//! nodes, PCK entries) open recursively through the same path.

use serde::Serialize;
use tracing::debug;
use veles_fsb::Fsb5File;
use veles_godot::{CompressedTexture, PckFile, ResourceFile, StreamTexture};
use veles_sniff::ContainerFormat;
use veles_unity::{AssetFile, BundleFile, ObjectData, TypeTree};

use crate::{Error, Result};

/// A named sub-item of a container.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub name: String,
    pub size: u64,
}

/// The format-specific parse result behind a [`Container`].
pub enum ContainerKind {
    UnityBundle(BundleFile),
    UnityAsset(AssetFile),
    GodotPck(PckFile),
    GodotResource(ResourceFile),
    StreamTexture(StreamTexture),
    CompressedTexture(CompressedTexture),
    Fsb5(Fsb5File),
    /// Identified-but-not-decoded and unknown payloads alike.
    Opaque,
}

/// One opened container: its identified format, its (possibly gzip-inflated)
/// bytes, and the parsed structure.
pub struct Container {
    pub name: String,
    pub format: ContainerFormat,
    kind: ContainerKind,
    data: Vec<u8>,
}

impl Container {
    /// Sniff and parse a buffer. Container-level failures are fatal to the
    /// whole buffer; there is no partially parsed container.
    pub fn open(data: Vec<u8>, name: &str) -> Result<Self> {
        let sniffed = veles_sniff::sniff(data, Some(name))?;
        let format = sniffed.format;
        let data = sniffed.data;
        debug!(name, %format, len = data.len(), "opening container");

        let kind = match format {
            ContainerFormat::UnityBundle => ContainerKind::UnityBundle(BundleFile::parse(&data)?),
            ContainerFormat::UnityAsset => ContainerKind::UnityAsset(AssetFile::parse(data.clone())?),
            ContainerFormat::GodotPck => ContainerKind::GodotPck(PckFile::parse(&data, 0)?),
            ContainerFormat::GodotResource => {
                ContainerKind::GodotResource(ResourceFile::parse(&data)?)
            }
            ContainerFormat::GodotStreamTexture => {
                ContainerKind::StreamTexture(StreamTexture::parse(&data)?)
            }
            ContainerFormat::GodotCompressedTexture => {
                ContainerKind::CompressedTexture(CompressedTexture::parse(&data)?)
            }
            ContainerFormat::Fsb5 => ContainerKind::Fsb5(Fsb5File::parse(&data)?),
            // Identified by magic only; their bytes pass through untouched.
            ContainerFormat::GodotScene
            | ContainerFormat::UnrealPak
            | ContainerFormat::UnrealPackage
            | ContainerFormat::Xnb
            | ContainerFormat::Pe
            | ContainerFormat::Elf
            | ContainerFormat::Resource => ContainerKind::Opaque,
        };

        Ok(Self {
            name: name.to_string(),
            format,
            kind,
            data,
        })
    }

    /// The parsed structure.
    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    /// The container's full bytes (inflated when it arrived gzip-wrapped).
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Named top-level entries: bundle nodes, package paths, objects by path
    /// ID, samples — or the container itself for single-payload formats.
    pub fn entries(&self) -> Vec<Entry> {
        match &self.kind {
            ContainerKind::UnityBundle(bundle) => bundle
                .files
                .iter()
                .map(|f| Entry {
                    name: f.node.path.clone(),
                    size: f.node.size,
                })
                .collect(),
            ContainerKind::UnityAsset(asset) => asset
                .objects()
                .iter()
                .map(|o| Entry {
                    name: o.path_id.to_string(),
                    size: o.size as u64,
                })
                .collect(),
            ContainerKind::GodotPck(pck) => pck
                .entries
                .iter()
                .map(|e| Entry {
                    name: e.path.clone(),
                    size: e.size,
                })
                .collect(),
            ContainerKind::Fsb5(bank) => bank
                .samples
                .iter()
                .enumerate()
                .map(|(i, s)| Entry {
                    name: s.name.clone().unwrap_or_else(|| format!("sample_{i}")),
                    size: s.data.len() as u64,
                })
                .collect(),
            ContainerKind::GodotResource(_)
            | ContainerKind::StreamTexture(_)
            | ContainerKind::CompressedTexture(_)
            | ContainerKind::Opaque => vec![Entry {
                name: self.name.clone(),
                size: self.data.len() as u64,
            }],
        }
    }

    /// Raw bytes of a named entry.
    pub fn entry_bytes(&self, name: &str) -> Result<Vec<u8>> {
        let missing = || Error::EntryNotFound(name.to_string());
        match &self.kind {
            ContainerKind::UnityBundle(bundle) => {
                Ok(bundle.file(name).ok_or_else(missing)?.data.clone())
            }
            ContainerKind::UnityAsset(asset) => {
                let path_id: i64 = name.parse().map_err(|_| missing())?;
                let info = asset.object_by_path_id(path_id).ok_or_else(missing)?;
                Ok(asset.object_bytes(info)?.to_vec())
            }
            ContainerKind::GodotPck(pck) => {
                let entry = pck.entry(name).ok_or_else(missing)?;
                Ok(pck.read_entry(&self.data, entry)?.to_vec())
            }
            ContainerKind::Fsb5(bank) => {
                let sample = bank
                    .samples
                    .iter()
                    .enumerate()
                    .find(|(i, s)| {
                        s.name.as_deref() == Some(name) || format!("sample_{i}") == name
                    })
                    .map(|(_, s)| s)
                    .ok_or_else(missing)?;
                Ok(sample.data.clone())
            }
            ContainerKind::GodotResource(_)
            | ContainerKind::StreamTexture(_)
            | ContainerKind::CompressedTexture(_)
            | ContainerKind::Opaque => {
                if name == self.name {
                    Ok(self.data.clone())
                } else {
                    Err(missing())
                }
            }
        }
    }

    /// Open a named entry as a nested container (bundles nest bundles and
    /// serialized files; package entries re-enter sniffing).
    pub fn open_entry(&self, name: &str) -> Result<Container> {
        Container::open(self.entry_bytes(name)?, name)
    }

    /// Decode an object by its path ID (Unity serialized files only).
    pub fn object_by_path_id(&self, path_id: i64) -> Result<&ObjectData> {
        match &self.kind {
            ContainerKind::UnityAsset(asset) => {
                let info = asset
                    .object_by_path_id(path_id)
                    .ok_or_else(|| Error::EntryNotFound(path_id.to_string()))?;
                Ok(asset.decode_object(info))
            }
            _ => Err(Error::NotDecoded(self.format)),
        }
    }

    /// The type tree for a class ID (Unity serialized files only).
    pub fn type_tree_for(&self, class_id: i32) -> Option<&TypeTree> {
        match &self.kind {
            ContainerKind::UnityAsset(asset) => asset.type_tree_for(class_id),
            _ => None,
        }
    }
}
