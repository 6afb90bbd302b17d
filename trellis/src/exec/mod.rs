//! Execution engine: dependency-ordered build over temp storage
//!
//! One node at a time. For each node: reconstruct the input tag map from
//! storage, run the tasks, verify no input was modified, attribute new
//! files to blocks, publish blocks and file-lists, then the completion
//! marker. Distribution across agents happens by running separate
//! processes with `--single-node`, sharing only the storage layers.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use crate::filespec::{FileSet, TagSetMap};
use crate::graph::{Graph, Node};
use crate::storage::{BlockRef, FileList, StoredFile, TempStorage};
use crate::task::TaskContext;

pub struct Executor<'a> {
    pub graph: &'a Graph,
    pub storage: &'a TempStorage,
}

impl Executor<'_> {
    /// Execute every node of the (selected) graph in dependency order
    pub fn execute_all(&self) -> Result<()> {
        let order = self.graph.execution_order()?;
        self.integrity_sweep(&order)?;

        for name in &order {
            let node = self.graph.node(name).context("node vanished from graph")?;
            self.execute_node(node)?;
        }
        Ok(())
    }

    /// Execute exactly one node, pulling its inputs from storage
    pub fn execute_single(&self, name: &str) -> Result<()> {
        let node = self
            .graph
            .node(name)
            .with_context(|| format!("Unknown node '{name}'"))?;
        self.execute_node(node)
    }

    /// Before anything runs, clear local state that can no longer be
    /// trusted: a node is cleaned when an input producer was cleaned this
    /// run, or when its own local state fails the integrity check. This
    /// keeps stale output from surviving upstream changes.
    fn integrity_sweep(&self, order: &[String]) -> Result<()> {
        let mut cleaned: HashSet<String> = HashSet::new();
        for name in order {
            let node = self.graph.node(name).context("node vanished from graph")?;
            let upstream_cleaned = node.inputs.iter().any(|input| {
                self.graph
                    .tag_producer(input)
                    .is_some_and(|(producer, _)| cleaned.contains(&producer.name))
            });
            let expected = expected_tags(node);
            let valid = !upstream_cleaned
                && self.storage.is_complete(&node.name, &expected)
                && self.storage.check_local_integrity(&node.name, &expected)?;
            if !valid {
                self.storage.clean_local_node(&node.name)?;
                cleaned.insert(node.name.clone());
            }
        }
        Ok(())
    }

    fn execute_node(&self, node: &Node) -> Result<()> {
        let expected = expected_tags(node);
        if self.storage.is_complete(&node.name, &expected) {
            println!("{} {} (already complete)", "skip".dimmed(), node.name);
            return Ok(());
        }
        println!("{} {}", "node".cyan().bold(), node.name.bold());

        let root = self.storage.root_dir().to_path_buf();

        // Reconstruct the input tag map and remember which block owns each
        // input file. Records are kept for the post-run tamper check.
        let mut tags = TagSetMap::new();
        let mut attribution: HashMap<String, BlockRef> = HashMap::new();
        let mut input_records: HashMap<String, StoredFile> = HashMap::new();
        let mut input_blocks: Vec<BlockRef> = Vec::new();

        for input in &node.inputs {
            let (producer, _) = self
                .graph
                .tag_producer(input)
                .with_context(|| format!("Undefined tag '{input}'"))?;
            let file_list = self
                .storage
                .read_file_list(&producer.name, input)
                .with_context(|| format!("Missing inputs for node '{}'", node.name))?;
            let files: FileSet = file_list.files.iter().map(|rel| root.join(rel)).collect();
            tags.insert(input.clone(), files);
            for block in &file_list.blocks {
                if !input_blocks.contains(block) {
                    input_blocks.push(block.clone());
                }
            }
        }

        for block in &input_blocks {
            let manifest = self.storage.retrieve(block)?;
            for record in manifest.files {
                if let Some(previous) = input_records.get(&record.path) {
                    if previous.digest != record.digest {
                        eprintln!(
                            "{} file '{}' appears in blocks '{}' and '{}' with different contents",
                            "error:".red().bold(),
                            record.path,
                            attribution
                                .get(&record.path)
                                .map(BlockRef::file_stem)
                                .unwrap_or_default(),
                            block.file_stem()
                        );
                    }
                }
                // Later block wins
                attribution.insert(record.path.clone(), block.clone());
                input_records.insert(record.path.clone(), record);
            }
        }

        // Inputs must be exactly as their producers left them, before any
        // task gets a chance to consume them
        self.tamper_check(&input_records)?;

        // Seed empty sets for this node's own outputs
        for output in &node.outputs {
            tags.entry(output.tag.clone()).or_default();
        }

        // Run the tasks in order; the first failure is fatal for the node
        let mut products = FileSet::new();
        for task in &node.tasks {
            let mut ctx = TaskContext {
                root_dir: &root,
                tags: &mut tags,
                build_products: &mut products,
            };
            task.task.execute(&mut ctx).with_context(|| {
                format!("Task <{}> failed in node '{}'", task.name, node.name)
            })?;
        }

        // Re-check after the tasks ran: a task modifying an upstream build
        // product is just as fatal as outside interference
        self.tamper_check(&input_records)?;

        self.publish_outputs(node, &tags, &products, &attribution)
    }

    fn tamper_check(&self, input_records: &HashMap<String, StoredFile>) -> Result<()> {
        for record in input_records.values() {
            if !record.matches_current(self.storage.root_dir()) {
                bail!(
                    "Build product '{}' from a previous step has been modified",
                    record.path
                );
            }
        }
        Ok(())
    }

    /// Attribute new files to blocks, archive the blocks, write file-lists
    /// and finally the completion marker.
    fn publish_outputs(
        &self,
        node: &Node,
        tags: &TagSetMap,
        products: &FileSet,
        attribution: &HashMap<String, BlockRef>,
    ) -> Result<()> {
        let root = self.storage.root_dir();

        // Everything this node wrote: build products plus all files placed
        // in its output tags
        let mut produced: FileSet = products.clone();
        for output in &node.outputs {
            if let Some(files) = tags.get(&output.tag) {
                produced.extend(files.iter().cloned());
            }
        }

        // Attribute each new file to a block named after the non-default
        // outputs that contain it; untagged files go to the default block
        let mut block_files: BTreeMap<String, FileSet> = BTreeMap::new();
        let mut file_block: HashMap<String, String> = HashMap::new();
        for file in &produced {
            let rel = crate::storage::manifest::relative_key(root, file)?;
            if attribution.contains_key(&rel) {
                continue;
            }
            let mut owners: Vec<&str> = node
                .outputs
                .iter()
                .filter(|output| !output.block_name().is_empty())
                .filter(|output| {
                    tags.get(&output.tag)
                        .is_some_and(|files| files.contains(file))
                })
                .map(|output| output.block_name())
                .collect();
            owners.sort_unstable();
            let block_name = match owners.len() {
                0 => String::new(),
                1 => owners[0].to_string(),
                _ => owners.join("+"),
            };
            block_files
                .entry(block_name.clone())
                .or_default()
                .insert(file.clone());
            file_block.insert(rel, block_name);
        }

        // The default output collects everything produced but not tagged
        let mut final_tags: BTreeMap<&str, FileSet> = node
            .outputs
            .iter()
            .map(|output| {
                (
                    output.tag.as_str(),
                    tags.get(&output.tag).cloned().unwrap_or_default(),
                )
            })
            .collect();
        if let Some(untagged) = block_files.get("") {
            let default_tag = node.default_output_tag();
            if let Some(files) = final_tags.get_mut(default_tag.as_str()) {
                files.extend(untagged.iter().cloned());
            }
        }

        // A tag must be mirrored when a node on another agent, or under
        // another trigger, consumes it
        let cross_agent_tags: BTreeSet<&str> = final_tags
            .keys()
            .copied()
            .filter(|tag| self.consumed_cross_agent(node, tag))
            .collect();

        for (block_name, files) in &block_files {
            let block = BlockRef::new(&node.name, block_name);
            let mirror = self.storage.has_shared()
                && cross_agent_tags.iter().any(|tag| {
                    final_tags
                        .get(tag)
                        .is_some_and(|tag_files| !tag_files.is_disjoint(files))
                });
            self.storage
                .write_block(&block, files, mirror)
                .with_context(|| format!("Failed to store block '{}'", block.file_stem()))?;
        }

        for output in &node.outputs {
            let files = final_tags.get(output.tag.as_str()).cloned().unwrap_or_default();
            let mut rel_files = Vec::with_capacity(files.len());
            let mut blocks: Vec<BlockRef> = Vec::new();
            for file in &files {
                let rel = crate::storage::manifest::relative_key(root, file)?;
                let block = match attribution.get(&rel) {
                    Some(block) => block.clone(),
                    None => {
                        let name = file_block.get(&rel).cloned().unwrap_or_default();
                        BlockRef::new(&node.name, &name)
                    }
                };
                if !blocks.contains(&block) {
                    blocks.push(block);
                }
                rel_files.push(rel);
            }
            rel_files.sort();
            blocks.sort();
            self.storage.write_file_list(
                &node.name,
                &FileList {
                    tag: output.tag.clone(),
                    files: rel_files,
                    blocks,
                },
                cross_agent_tags.contains(output.tag.as_str()),
            )?;
        }

        self.storage.write_complete_marker(&node.name)?;
        println!("{} {}", "done".green().bold(), node.name);
        Ok(())
    }

    /// Whether some other node, on a different agent or under a different
    /// trigger, consumes this tag
    fn consumed_cross_agent(&self, producer: &Node, tag: &str) -> bool {
        self.graph.nodes().any(|consumer| {
            consumer.name != producer.name
                && consumer.inputs.iter().any(|input| input == tag)
                && (consumer.agent != producer.agent || consumer.trigger != producer.trigger)
        })
    }
}

/// All output tags of a node, default included
pub fn expected_tags(node: &Node) -> Vec<String> {
    node.outputs.iter().map(|output| output.tag.clone()).collect()
}

/// Union of the token paths required by a set of nodes, in declaration order
pub fn required_tokens(graph: &Graph, names: &[String]) -> Vec<PathBuf> {
    let mut tokens = Vec::new();
    for name in names {
        if let Some(node) = graph.node(name) {
            for token in &node.tokens {
                if !tokens.contains(token) {
                    tokens.push(token.clone());
                }
            }
        }
    }
    tokens
}
