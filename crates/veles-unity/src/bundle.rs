//! UnityFS bundle parsing.
//!
//! A bundle is a header, a (possibly relocated, possibly compressed) block
//! info table, and a body of independently compressed storage blocks that
//! concatenate into one contiguous buffer. Named nodes slice virtual files
//! out of that buffer; a node can itself be another bundle or a serialized
//! file, so each node's bytes are re-sniffed.

use rayon::prelude::*;
use tracing::debug;
use veles_common::{ByteCursor, Endian, Whence};
use veles_compress::Scheme;
use veles_sniff::ContainerFormat;

use crate::{Error, Result};

/// Bundle-level flags word.
#[derive(Debug, Clone, Copy)]
pub struct BundleFlags {
    pub compression_type: u32,
    pub has_dir_info: bool,
    pub block_info_at_end: bool,
    pub old_web_plugin_compat: bool,
    pub block_info_has_padding: bool,
}

impl From<u32> for BundleFlags {
    fn from(value: u32) -> Self {
        Self {
            compression_type: value & 0x3F,
            has_dir_info: value & 0x40 != 0,
            block_info_at_end: value & 0x80 != 0,
            old_web_plugin_compat: value & 0x100 != 0,
            block_info_has_padding: value & 0x200 != 0,
        }
    }
}

/// Per-block flags word.
#[derive(Debug, Clone, Copy)]
pub struct BlockFlags {
    pub compression_type: u32,
    pub is_streamed: bool,
}

impl From<u16> for BlockFlags {
    fn from(value: u16) -> Self {
        Self {
            compression_type: (value & 0x3F) as u32,
            is_streamed: value & 0x40 != 0,
        }
    }
}

/// One independently compressed chunk of the bundle body.
#[derive(Debug, Clone, Copy)]
pub struct StorageBlock {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: BlockFlags,
}

/// A named virtual file inside the reconstructed body.
#[derive(Debug, Clone)]
pub struct BundleNode {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
    pub path: String,
}

/// A node plus its sliced bytes and re-sniffed format.
#[derive(Debug, Clone)]
pub struct NodeFile {
    pub node: BundleNode,
    pub data: Vec<u8>,
    pub format: ContainerFormat,
}

/// A parsed UnityFS bundle.
#[derive(Debug)]
pub struct BundleFile {
    pub magic: String,
    pub version: u32,
    pub unity_version: String,
    pub unity_revision: String,
    pub size: u64,
    pub flags: BundleFlags,
    pub blocks: Vec<StorageBlock>,
    pub nodes: Vec<BundleNode>,
    pub files: Vec<NodeFile>,
}

/// Map a bundle/block compression tag to a codec scheme.
fn scheme_for(tag: u32) -> Result<Scheme> {
    match tag {
        0 => Ok(Scheme::None),
        1 => Ok(Scheme::Lzma),
        2 => Ok(Scheme::Lz4),
        3 => Ok(Scheme::Lz4Hc),
        // 4 is LZHAM, which never shipped in a supported decoder.
        other => Err(Error::Compress(veles_compress::Error::UnsupportedScheme(
            other,
        ))),
    }
}

impl BundleFile {
    /// Parse a bundle from its raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data, Endian::Big);

        let magic = cursor.read_cstring()?;
        let version = cursor.read_u32()?;
        let unity_version = cursor.read_cstring()?;
        let unity_revision = cursor.read_cstring()?;

        match magic.as_str() {
            "UnityFS" => {}
            // Web/raw bundles share the FS layout from format 6 on.
            "UnityWeb" | "UnityRaw" if version >= 6 => {}
            "UnityWeb" | "UnityRaw" | "UnityArchive" => {
                return Err(Error::UnsupportedBundle { magic, version });
            }
            _ => return Err(Error::BadMagic(magic)),
        }

        let size = cursor.read_u64()?;
        let compressed_block_info_size = cursor.read_u32()? as usize;
        let uncompressed_block_info_size = cursor.read_u32()? as usize;
        let flags = BundleFlags::from(cursor.read_u32()?);
        if magic != "UnityFS" {
            cursor.read(1)?;
        }
        if version >= 7 {
            cursor.align(16)?;
        }

        debug!(
            magic,
            version,
            unity_version,
            compression = flags.compression_type,
            at_end = flags.block_info_at_end,
            "parsed bundle header"
        );

        // The block info table may live at the end of the stream; read it
        // from there and restore the cursor to where the block payloads
        // begin.
        let block_info_raw = if flags.block_info_at_end {
            let restore = cursor.tell();
            cursor.seek(-(compressed_block_info_size as i64), Whence::End)?;
            let raw = cursor.read(compressed_block_info_size)?;
            cursor.seek(restore as i64, Whence::Set)?;
            raw
        } else {
            cursor.read(compressed_block_info_size)?
        };

        let block_info = veles_compress::decompress(
            scheme_for(flags.compression_type)?,
            block_info_raw,
            uncompressed_block_info_size,
        )?;

        let mut info = ByteCursor::new(&block_info, Endian::Big);
        let _data_hash = info.read(16)?;
        let block_count = info.read_u32()? as usize;
        let mut blocks = Vec::with_capacity(block_count.min(block_info.len()));
        for _ in 0..block_count {
            blocks.push(StorageBlock {
                uncompressed_size: info.read_u32()?,
                compressed_size: info.read_u32()?,
                flags: BlockFlags::from(info.read_u16()?),
            });
        }
        let node_count = info.read_u32()? as usize;
        let mut nodes = Vec::with_capacity(node_count.min(block_info.len()));
        for _ in 0..node_count {
            nodes.push(BundleNode {
                offset: info.read_u64()?,
                size: info.read_u64()?,
                flags: info.read_u32()?,
                path: info.read_cstring()?,
            });
        }

        let body = Self::reconstruct_body(&mut cursor, &blocks)?;
        let files = Self::slice_nodes(&nodes, &body)?;

        Ok(Self {
            magic,
            version,
            unity_version,
            unity_revision,
            size,
            flags,
            blocks,
            nodes,
            files,
        })
    }

    /// Read each block's compressed bytes in declared order, decompress them
    /// independently, and concatenate. The result's length must equal the sum
    /// of the declared uncompressed sizes exactly.
    fn reconstruct_body(cursor: &mut ByteCursor<'_>, blocks: &[StorageBlock]) -> Result<Vec<u8>> {
        let mut slices = Vec::with_capacity(blocks.len());
        for block in blocks {
            slices.push(cursor.read(block.compressed_size as usize)?);
        }

        // Blocks are independent; decompress them in parallel.
        let decompressed: Vec<Result<Vec<u8>>> = slices
            .into_par_iter()
            .zip(blocks.par_iter())
            .map(|(raw, block)| {
                let scheme = scheme_for(block.flags.compression_type)?;
                Ok(veles_compress::decompress(
                    scheme,
                    raw,
                    block.uncompressed_size as usize,
                )?)
            })
            .collect();

        let expected: u64 = blocks.iter().map(|b| b.uncompressed_size as u64).sum();
        let mut body = Vec::with_capacity(expected as usize);
        for part in decompressed {
            body.extend_from_slice(&part?);
        }
        if body.len() as u64 != expected {
            return Err(Error::BodySizeMismatch {
                expected,
                actual: body.len() as u64,
            });
        }
        Ok(body)
    }

    fn slice_nodes(nodes: &[BundleNode], body: &[u8]) -> Result<Vec<NodeFile>> {
        let mut files = Vec::with_capacity(nodes.len());
        for node in nodes {
            let end = node.offset.checked_add(node.size);
            if end.is_none() || end.unwrap() > body.len() as u64 {
                return Err(Error::NodeOutOfBounds {
                    path: node.path.clone(),
                    offset: node.offset,
                    size: node.size,
                    body_len: body.len() as u64,
                });
            }
            let data = body[node.offset as usize..(node.offset + node.size) as usize].to_vec();
            let format = veles_sniff::identify(&data, Some(&node.path));
            files.push(NodeFile {
                node: node.clone(),
                data,
                format,
            });
        }
        Ok(files)
    }

    /// Look up a node file by its path.
    pub fn file(&self, path: &str) -> Option<&NodeFile> {
        self.files.iter().find(|f| f.node.path == path)
    }
}
