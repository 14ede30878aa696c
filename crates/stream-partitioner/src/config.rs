// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The line-based partition configuration file.
//!
//! # Format
//! ```text
//! Line 1:        <PartitionerName>            e.g. "DummyPartition"
//! Line 2:        ExecutionProviders:<int>     number of providers P
//! Lines 3..2+P:  <ProviderName>:<int>         streams per provider
//! Remaining:     <node>,<node>,...            one line per stream,
//!                                             in provider order
//! ```
//!
//! The total number of stream lines must equal the sum of the per-provider
//! stream counts, and no node may appear on two streams.

use crate::PartitionError;
use std::path::Path;

/// Parsed contents of a partition configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Name of the partitioner that produced (and can consume) this file.
    pub partitioner_name: String,
    /// `(provider name, stream count)` in file order.
    pub provider_streams: Vec<(String, usize)>,
    /// Node names per stream, in provider order.
    pub stream_node_names: Vec<Vec<String>>,
}

impl PartitionConfig {
    /// A config carrying only the partitioner name — the write-back marker
    /// left behind when no partition has been derived yet.
    pub fn name_only(partitioner_name: impl Into<String>) -> Self {
        Self {
            partitioner_name: partitioner_name.into(),
            ..Default::default()
        }
    }

    /// Returns `true` when the config carries no stream assignments, i.e.
    /// the default partition must be derived (and written back).
    pub fn is_empty(&self) -> bool {
        self.provider_streams.is_empty() && self.stream_node_names.is_empty()
    }

    /// Total stream count declared by the provider lines.
    pub fn num_streams(&self) -> usize {
        self.provider_streams.iter().map(|(_, n)| n).sum()
    }

    /// Parses a configuration from its textual form.
    pub fn parse(text: &str) -> Result<Self, PartitionError> {
        let mut lines = text.lines();

        let partitioner_name = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                PartitionError::InvalidConfig(
                    "configuration file should start with a line of partition name".into(),
                )
            })?
            .trim()
            .to_string();

        let Some(provider_line) = lines.next() else {
            // Name-only file: derive the default partition and write back.
            return Ok(Self::name_only(partitioner_name));
        };

        let (key, count) = split_kv(provider_line)?;
        if key != "ExecutionProviders" {
            return Err(PartitionError::InvalidConfig(
                "2nd line of configuration file should be of format: ExecutionProviders:<an integer>"
                    .into(),
            ));
        }
        let num_providers: usize = count.parse().map_err(|_| {
            PartitionError::InvalidConfig(
                "2nd line, the number of ExecutionProviders must be a positive value".into(),
            )
        })?;
        if num_providers == 0 {
            return Err(PartitionError::InvalidConfig(
                "2nd line, the number of ExecutionProviders must be a positive value".into(),
            ));
        }

        let mut provider_streams = Vec::with_capacity(num_providers);
        for _ in 0..num_providers {
            let line = lines.next().ok_or_else(|| {
                PartitionError::InvalidConfig(
                    "failed to read execution provider stream setting".into(),
                )
            })?;
            let (provider, streams) = split_kv(line)?;
            let streams: usize = streams.parse().map_err(|_| {
                PartitionError::InvalidConfig(format!(
                    "stream count for provider '{provider}' must be an integer",
                ))
            })?;
            provider_streams.push((provider.to_string(), streams));
        }

        let mut stream_node_names = Vec::new();
        for line in lines {
            let names: Vec<String> = line
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if names.is_empty() {
                return Err(PartitionError::InvalidConfig(
                    "the line of node names is empty".into(),
                ));
            }
            stream_node_names.push(names);
        }

        let config = Self {
            partitioner_name,
            provider_streams,
            stream_node_names,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates stream-line count and node-name uniqueness.
    pub fn validate(&self) -> Result<(), PartitionError> {
        if self.stream_node_names.len() != self.num_streams() {
            return Err(PartitionError::InvalidConfig(
                "the total number of stream lines mismatches the sum of execution provider stream settings"
                    .into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for names in &self.stream_node_names {
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(PartitionError::InvalidConfig(format!(
                        "node '{name}' is assigned to more than one stream",
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serializes the configuration back to its textual form.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.partitioner_name);
        out.push('\n');
        if self.is_empty() {
            return out;
        }
        out.push_str(&format!("ExecutionProviders:{}\n", self.provider_streams.len()));
        for (provider, streams) in &self.provider_streams {
            out.push_str(&format!("{provider}:{streams}\n"));
        }
        for names in &self.stream_node_names {
            out.push_str(&names.join(","));
            out.push('\n');
        }
        out
    }

    /// Loads a configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, PartitionError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Writes the configuration to a file, replacing any previous content.
    pub fn write_file(&self, path: &Path) -> Result<(), PartitionError> {
        std::fs::write(path, self.serialize())?;
        Ok(())
    }
}

fn split_kv(line: &str) -> Result<(&str, &str), PartitionError> {
    let mut parts = line.trim().splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(k), Some(v)) if !k.is_empty() && !v.is_empty() => Ok((k, v)),
        _ => Err(PartitionError::InvalidConfig(format!(
            "expected '<name>:<value>' but found '{line}'",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        "DummyPartition\n\
         ExecutionProviders:2\n\
         CpuExecutionProvider:2\n\
         GpuExecutionProvider:1\n\
         relu0,relu1\n\
         relu2\n\
         mm0,mm1\n"
    }

    #[test]
    fn test_parse_full_config() {
        let c = PartitionConfig::parse(sample()).unwrap();
        assert_eq!(c.partitioner_name, "DummyPartition");
        assert_eq!(c.num_streams(), 3);
        assert_eq!(c.stream_node_names.len(), 3);
        assert_eq!(c.stream_node_names[2], vec!["mm0", "mm1"]);
        assert!(!c.is_empty());
    }

    #[test]
    fn test_parse_name_only() {
        let c = PartitionConfig::parse("DummyPartition\n").unwrap();
        assert!(c.is_empty());
        assert_eq!(c.partitioner_name, "DummyPartition");
    }

    #[test]
    fn test_parse_empty_file() {
        assert!(matches!(
            PartitionConfig::parse(""),
            Err(PartitionError::InvalidConfig(_)),
        ));
    }

    #[test]
    fn test_bad_provider_header() {
        let text = "DummyPartition\nProviders:2\n";
        let err = PartitionConfig::parse(text).unwrap_err();
        assert!(err.to_string().contains("ExecutionProviders"));
    }

    #[test]
    fn test_zero_providers_rejected() {
        let text = "DummyPartition\nExecutionProviders:0\n";
        assert!(PartitionConfig::parse(text).is_err());
    }

    #[test]
    fn test_stream_count_mismatch() {
        let text = "DummyPartition\n\
                    ExecutionProviders:1\n\
                    CpuExecutionProvider:2\n\
                    relu0\n";
        let err = PartitionConfig::parse(text).unwrap_err();
        assert!(err.to_string().contains("mismatches"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let text = "DummyPartition\n\
                    ExecutionProviders:1\n\
                    CpuExecutionProvider:2\n\
                    relu0,relu1\n\
                    relu1\n";
        let err = PartitionConfig::parse(text).unwrap_err();
        assert!(err.to_string().contains("more than one stream"));
    }

    #[test]
    fn test_empty_stream_line_rejected() {
        let text = "DummyPartition\n\
                    ExecutionProviders:1\n\
                    CpuExecutionProvider:2\n\
                    relu0\n\
                    \n";
        assert!(PartitionConfig::parse(text).is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let c = PartitionConfig::parse(sample()).unwrap();
        let text = c.serialize();
        let back = PartitionConfig::parse(&text).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = std::env::temp_dir().join("stream_rt_partition_cfg_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partition.cfg");

        let c = PartitionConfig::parse(sample()).unwrap();
        c.write_file(&path).unwrap();
        let back = PartitionConfig::from_file(&path).unwrap();
        assert_eq!(back, c);

        std::fs::remove_file(&path).ok();
    }
}
