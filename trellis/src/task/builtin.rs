//! Built-in task set
//!
//! These cover the file plumbing a graph needs out of the box: copying,
//! deleting, tagging, logging, writing text files and spawning external
//! commands. Anything heavier is expected to come from task modules that
//! register their own descriptors.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use super::{
    BoundParams, ParamKind, ParamSpec, Task, TaskContext, TaskDescriptor, TaskRegistry,
};
use crate::filespec::{self, FileSet};

/// Register the built-in tasks into a registry
pub fn register_builtin_tasks(registry: &mut TaskRegistry) {
    registry.register(copy_descriptor());
    registry.register(delete_descriptor());
    registry.register(tag_descriptor());
    registry.register(log_descriptor());
    registry.register(spawn_descriptor());
    registry.register(write_text_file_descriptor());
}

fn param(
    name: &'static str,
    kind: ParamKind,
    optional: bool,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        optional,
        description,
    }
}

// ---------------------------------------------------------------- Copy

struct CopyTask {
    files: String,
    from: Option<String>,
    to: String,
    tag: Option<String>,
}

fn copy_descriptor() -> TaskDescriptor {
    TaskDescriptor {
        name: "Copy",
        description: "Copy files into a target directory, optionally tagging the copies",
        restricted: false,
        params: vec![
            param("Files", ParamKind::FileSpec, false, "Files to copy"),
            param(
                "From",
                ParamKind::String,
                true,
                "Base directory; copies keep their layout relative to it",
            ),
            param("To", ParamKind::String, false, "Destination directory"),
            param("Tag", ParamKind::TagRef, true, "Tag to apply to the copied files"),
        ],
        construct: |params| {
            Ok(Box::new(CopyTask {
                files: params.file_spec("Files").unwrap_or_default().to_string(),
                from: params.string("From").map(str::to_string),
                to: params.require_string("To")?.to_string(),
                tag: params.tag("Tag").map(str::to_string),
            }))
        },
    }
}

impl Task for CopyTask {
    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let sources = ctx.resolve_spec(&self.files)?;
        let to_dir = if PathBuf::from(&self.to).is_absolute() {
            PathBuf::from(&self.to)
        } else {
            ctx.root_dir.join(&self.to)
        };
        let from_dir = self.from.as_ref().map(|from| {
            let path = PathBuf::from(from);
            if path.is_absolute() {
                path
            } else {
                ctx.root_dir.join(path)
            }
        });

        let mut copied = FileSet::new();
        for source in &sources {
            let dest = match &from_dir {
                Some(base) => {
                    let rel = source.strip_prefix(base).with_context(|| {
                        format!(
                            "File {} is not under From directory {}",
                            source.display(),
                            base.display()
                        )
                    })?;
                    to_dir.join(rel)
                }
                None => match source.file_name() {
                    Some(name) => to_dir.join(name),
                    None => bail!("Cannot copy {}: no file name", source.display()),
                },
            };
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::copy(source, &dest).with_context(|| {
                format!("Failed to copy {} to {}", source.display(), dest.display())
            })?;
            copied.insert(dest);
        }

        ctx.add_build_products(&copied);
        if let Some(tag) = &self.tag {
            ctx.add_to_tag(tag, &copied);
        }
        println!("  copied {} file(s) to {}", copied.len(), self.to);
        Ok(())
    }

    fn consumed_tags(&self) -> Vec<String> {
        filespec::tags_in_spec(&self.files)
    }

    fn produced_tags(&self) -> Vec<String> {
        self.tag.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------- Delete

struct DeleteTask {
    files: String,
}

fn delete_descriptor() -> TaskDescriptor {
    TaskDescriptor {
        name: "Delete",
        description: "Delete files from the workspace",
        restricted: false,
        params: vec![param("Files", ParamKind::FileSpec, false, "Files to delete")],
        construct: |params| {
            Ok(Box::new(DeleteTask {
                files: params.file_spec("Files").unwrap_or_default().to_string(),
            }))
        },
    }
}

impl Task for DeleteTask {
    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let targets = ctx.resolve_spec(&self.files)?;
        let mut deleted = 0usize;
        for target in &targets {
            match fs::remove_file(target) {
                Ok(()) => deleted += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to delete {}", target.display()));
                }
            }
        }
        println!("  deleted {deleted} file(s)");
        Ok(())
    }

    fn consumed_tags(&self) -> Vec<String> {
        filespec::tags_in_spec(&self.files)
    }
}

// ---------------------------------------------------------------- Tag

struct TagTask {
    files: String,
    with: String,
}

fn tag_descriptor() -> TaskDescriptor {
    TaskDescriptor {
        name: "Tag",
        description: "Add files matching a spec to a named tag",
        restricted: false,
        params: vec![
            param("Files", ParamKind::FileSpec, false, "Files to tag"),
            param("With", ParamKind::TagRef, false, "Tag to apply"),
        ],
        construct: |params| {
            Ok(Box::new(TagTask {
                files: params.file_spec("Files").unwrap_or_default().to_string(),
                with: params
                    .tag("With")
                    .map(str::to_string)
                    .context("Missing required attribute 'With'")?,
            }))
        },
    }
}

impl Task for TagTask {
    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let files = ctx.resolve_spec(&self.files)?;
        ctx.add_to_tag(&self.with, &files);
        println!("  tagged {} file(s) as {}", files.len(), self.with);
        Ok(())
    }

    fn consumed_tags(&self) -> Vec<String> {
        filespec::tags_in_spec(&self.files)
    }

    fn produced_tags(&self) -> Vec<String> {
        vec![self.with.clone()]
    }
}

// ---------------------------------------------------------------- Log

struct LogTask {
    message: String,
    files: Option<String>,
}

fn log_descriptor() -> TaskDescriptor {
    TaskDescriptor {
        name: "Log",
        description: "Print a message, optionally listing a file set",
        restricted: false,
        params: vec![
            param("Message", ParamKind::String, false, "Message to print"),
            param("Files", ParamKind::FileSpec, true, "Files to list after the message"),
        ],
        construct: |params| {
            Ok(Box::new(LogTask {
                message: params.require_string("Message")?.to_string(),
                files: params.file_spec("Files").map(str::to_string),
            }))
        },
    }
}

impl Task for LogTask {
    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        println!("  {}", self.message);
        if let Some(spec) = &self.files {
            for file in ctx.resolve_spec(spec)? {
                let shown = file
                    .strip_prefix(ctx.root_dir)
                    .unwrap_or(&file)
                    .display()
                    .to_string();
                println!("    {}", shown.dimmed());
            }
        }
        Ok(())
    }

    fn consumed_tags(&self) -> Vec<String> {
        self.files
            .as_deref()
            .map(filespec::tags_in_spec)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------- Spawn

struct SpawnTask {
    exe: String,
    arguments: Vec<String>,
    working_dir: Option<String>,
    error_level: i64,
}

fn spawn_descriptor() -> TaskDescriptor {
    TaskDescriptor {
        name: "Spawn",
        description: "Run an external command and fail the node on a bad exit code",
        restricted: false,
        params: vec![
            param("Exe", ParamKind::String, false, "Executable to run"),
            param(
                "Arguments",
                ParamKind::String,
                true,
                "Whitespace-separated argument string",
            ),
            param("WorkingDir", ParamKind::String, true, "Working directory"),
            param(
                "ErrorLevel",
                ParamKind::Int,
                true,
                "Highest exit code treated as success (default 0)",
            ),
        ],
        construct: |params| {
            Ok(Box::new(SpawnTask {
                exe: params.require_string("Exe")?.to_string(),
                arguments: params
                    .string("Arguments")
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                working_dir: params.string("WorkingDir").map(str::to_string),
                error_level: params.int_or("ErrorLevel", 0),
            }))
        },
    }
}

impl Task for SpawnTask {
    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let cwd = match &self.working_dir {
            Some(dir) => {
                let path = PathBuf::from(dir);
                if path.is_absolute() {
                    path
                } else {
                    ctx.root_dir.join(path)
                }
            }
            None => ctx.root_dir.to_path_buf(),
        };
        println!("  running {} {}", self.exe, self.arguments.join(" "));
        let status = Command::new(&self.exe)
            .args(&self.arguments)
            .current_dir(&cwd)
            .status()
            .with_context(|| format!("Failed to start '{}'", self.exe))?;
        let code = status.code().unwrap_or(-1);
        if i64::from(code) > self.error_level || code < 0 {
            bail!("'{}' exited with code {code}", self.exe);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------- WriteTextFile

struct WriteTextFileTask {
    file: String,
    text: String,
    append: bool,
    tag: Option<String>,
}

fn write_text_file_descriptor() -> TaskDescriptor {
    TaskDescriptor {
        name: "WriteTextFile",
        description: "Write (or append) text to a file in the workspace",
        restricted: false,
        params: vec![
            param("File", ParamKind::String, false, "File to write"),
            param("Text", ParamKind::String, false, "Text content"),
            param("Append", ParamKind::Bool, true, "Append instead of overwrite"),
            param("Tag", ParamKind::TagRef, true, "Tag to apply to the file"),
        ],
        construct: |params| {
            Ok(Box::new(WriteTextFileTask {
                file: params.require_string("File")?.to_string(),
                text: params.require_string("Text")?.to_string(),
                append: params.bool_or("Append", false),
                tag: params.tag("Tag").map(str::to_string),
            }))
        },
    }
}

impl Task for WriteTextFileTask {
    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let path = {
            let candidate = PathBuf::from(&self.file);
            if candidate.is_absolute() {
                candidate
            } else {
                ctx.root_dir.join(candidate)
            }
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if self.append {
            use std::io::Write;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            writeln!(file, "{}", self.text)
                .with_context(|| format!("Failed to append to {}", path.display()))?;
        } else {
            fs::write(&path, format!("{}\n", self.text))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let mut produced = FileSet::new();
        produced.insert(path);
        ctx.add_build_products(&produced);
        if let Some(tag) = &self.tag {
            ctx.add_to_tag(tag, &produced);
        }
        Ok(())
    }

    fn produced_tags(&self) -> Vec<String> {
        self.tag.iter().cloned().collect()
    }
}
