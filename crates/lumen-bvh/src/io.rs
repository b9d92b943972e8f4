//! Binary BVH cache files.
//!
//! Layout: the magic bytes `LBVH`, a little-endian `u32` format version, a
//! little-endian `u32` node count, then the raw node array. Loaded trees
//! are validated before they are handed out.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bytemuck::Zeroable;
use log::info;

use crate::bvh::{Bvh, Node};
use crate::error::{BvhError, Result};

const MAGIC: [u8; 4] = *b"LBVH";
const VERSION: u32 = 1;

// nodes read per step, 2 MiB
const READ_CHUNK_NODES: usize = 1 << 16;

impl Bvh {
    /// Serialize the node array to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(self.num_nodes() as u32).to_le_bytes())?;
        writer.write_all(bytemuck::cast_slice(self.nodes()))?;
        Ok(())
    }

    /// Deserialize and validate a tree written by [`Bvh::write_to`].
    ///
    /// `num_leaves`, when known, bounds the primitive indices leaves may
    /// reference.
    pub fn read_from<R: Read>(reader: &mut R, num_leaves: Option<u32>) -> Result<Bvh> {
        let mut magic = [0u8; 4];
        read_header_field(reader, &mut magic)?;
        if magic != MAGIC {
            return Err(BvhError::InvalidCache("bad magic".into()));
        }

        let mut word = [0u8; 4];
        read_header_field(reader, &mut word)?;
        let version = u32::from_le_bytes(word);
        if version != VERSION {
            return Err(BvhError::InvalidCache(format!(
                "unsupported version {version}"
            )));
        }

        read_header_field(reader, &mut word)?;
        let num_nodes = u32::from_le_bytes(word) as usize;

        // grow with the data actually read
        let mut nodes: Vec<Node> = Vec::new();
        while nodes.len() < num_nodes {
            let start = nodes.len();
            let chunk = (num_nodes - start).min(READ_CHUNK_NODES);
            nodes.try_reserve(chunk).map_err(|_| BvhError::Allocation {
                requested: num_nodes,
                what: "BVH nodes",
            })?;
            nodes.resize(start + chunk, Node::zeroed());

            reader
                .read_exact(bytemuck::cast_slice_mut(&mut nodes[start..]))
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => {
                        BvhError::InvalidCache(format!("truncated node array, expected {num_nodes} nodes"))
                    }
                    _ => BvhError::Io(e),
                })?;
        }

        Bvh::from_nodes(nodes, num_leaves)
    }

    /// Write the tree to a cache file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!("Saved BVH with {} nodes to {}", self.num_nodes(), path.display());
        Ok(())
    }

    /// Load a tree from a cache file.
    pub fn load_from_file(path: impl AsRef<Path>, num_leaves: Option<u32>) -> Result<Bvh> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let bvh = Bvh::read_from(&mut reader, num_leaves)?;
        info!("Loaded BVH with {} nodes from {}", bvh.num_nodes(), path.display());
        Ok(bvh)
    }
}

fn read_header_field<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => BvhError::InvalidCache("truncated header".into()),
        _ => BvhError::Io(e),
    })
}
