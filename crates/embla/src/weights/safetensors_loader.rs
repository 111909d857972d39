//! Memory-mapped safetensors checkpoint loader.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use memmap2::Mmap;
use safetensors::tensor::TensorView;
use safetensors::SafeTensors;

/// A loader over one or more `.safetensors` shards.
#[derive(Debug)]
pub struct SafeTensorsLoader {
    shards: Vec<ShardInfo>,
    tensor_to_shard: HashMap<String, usize>,
}

#[derive(Debug)]
struct ShardInfo {
    #[allow(dead_code)]
    mmap: Arc<Mmap>,
    // The 'static lifetime holds because the mmap is kept alive in the Arc
    // stored alongside the parsed view.
    tensors: SafeTensors<'static>,
}

impl SafeTensorsLoader {
    /// Creates a loader from a direct file path or a checkpoint directory.
    ///
    /// A directory is resolved in order: `model.safetensors.index.json`
    /// (sharded), `model.safetensors`, then any `*.safetensors` files in
    /// lexical order.
    pub fn new(path: &Path) -> Result<Self> {
        if path.is_file() {
            let (shards, tensor_to_shard) = Self::load_files(&[path.to_path_buf()])?;
            return Ok(Self {
                shards,
                tensor_to_shard,
            });
        }

        if !path.is_dir() {
            return Err(anyhow!("path {:?} is neither a file nor a directory", path));
        }

        let index_file = path.join("model.safetensors.index.json");
        let single_file = path.join("model.safetensors");
        let (shards, tensor_to_shard) = if index_file.exists() {
            Self::load_sharded(path)?
        } else if single_file.exists() {
            Self::load_files(&[single_file])?
        } else {
            let mut files: Vec<_> = fs::read_dir(path)
                .with_context(|| format!("failed to read directory {:?}", path))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "safetensors"))
                .collect();
            files.sort();
            if files.is_empty() {
                return Err(anyhow!("no safetensors files found in {:?}", path));
            }
            Self::load_files(&files)?
        };

        Ok(Self {
            shards,
            tensor_to_shard,
        })
    }

    fn load_files(
        paths: &[std::path::PathBuf],
    ) -> Result<(Vec<ShardInfo>, HashMap<String, usize>)> {
        let mut shards = Vec::with_capacity(paths.len());
        let mut tensor_to_shard = HashMap::new();

        for (idx, path) in paths.iter().enumerate() {
            let shard = Self::load_shard(path)?;
            for name in shard.tensors.names() {
                tensor_to_shard.insert(name.to_string(), idx);
            }
            log::debug!(
                "loaded shard {}/{}: {} tensors from {:?}",
                idx + 1,
                paths.len(),
                shard.tensors.names().len(),
                path.file_name().unwrap_or_default()
            );
            shards.push(shard);
        }

        Ok((shards, tensor_to_shard))
    }

    fn load_sharded(path: &Path) -> Result<(Vec<ShardInfo>, HashMap<String, usize>)> {
        let index_path = path.join("model.safetensors.index.json");
        let index_content = fs::read_to_string(&index_path)
            .with_context(|| format!("failed to read index file: {:?}", index_path))?;

        let index: serde_json::Value =
            serde_json::from_str(&index_content).context("failed to parse index.json")?;

        let weight_map = index["weight_map"]
            .as_object()
            .ok_or_else(|| anyhow!("invalid index.json: missing 'weight_map' object"))?;

        let mut unique_files: Vec<String> = weight_map
            .values()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
        unique_files.sort();
        unique_files.dedup();

        log::info!(
            "loading sharded checkpoint: {} shards, {} tensors",
            unique_files.len(),
            weight_map.len()
        );

        let paths: Vec<_> = unique_files.iter().map(|f| path.join(f)).collect();
        let (shards, _) = Self::load_files(&paths)?;

        let file_to_shard_idx: HashMap<&String, usize> = unique_files
            .iter()
            .enumerate()
            .map(|(idx, f)| (f, idx))
            .collect();
        let tensor_to_shard = weight_map
            .iter()
            .filter_map(|(name, file_val)| {
                let filename = file_val.as_str()?;
                let shard_idx = file_to_shard_idx.get(&filename.to_string())?;
                Some((name.clone(), *shard_idx))
            })
            .collect();

        Ok((shards, tensor_to_shard))
    }

    fn load_shard(path: &Path) -> Result<ShardInfo> {
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open safetensors file: {:?}", path))?;
        let mmap = Arc::new(unsafe { Mmap::map(&file)? });
        let static_slice: &'static [u8] =
            unsafe { std::mem::transmute::<&[u8], &'static [u8]>(&mmap[..]) };

        let tensors = SafeTensors::deserialize(static_slice)
            .with_context(|| format!("failed to parse safetensors: {:?}", path))?;

        Ok(ShardInfo { mmap, tensors })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensor_to_shard.contains_key(name)
    }

    pub fn tensor_names(&self) -> Vec<&str> {
        self.tensor_to_shard.keys().map(|s| s.as_str()).collect()
    }

    pub fn tensor_count(&self) -> usize {
        self.tensor_to_shard.len()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the raw view for a tensor, searching across shards.
    pub fn tensor(&self, name: &str) -> Result<TensorView<'_>> {
        let shard_idx = self
            .tensor_to_shard
            .get(name)
            .ok_or_else(|| anyhow!("tensor '{}' not found in checkpoint", name))?;

        self.shards[*shard_idx]
            .tensors
            .tensor(name)
            .with_context(|| format!("failed to read tensor '{}'", name))
    }
}
