//! Small local code index used to pick context for model prompts.
//!
//! Embeddings are a 16-bucket character histogram, not a semantic model.
//! They are cheap, deterministic and good enough to rank files that share
//! vocabulary with the query.

use asiat_core::{AsiatError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use syn::visit::{self, Visit};
use syn::{FnArg, ItemConst, ItemEnum, ItemFn, ItemStruct, ItemTrait, Pat, TraitItem};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

pub const EMBEDDING_DIMENSIONS: usize = 16;

const SUPPORTED_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "json", "md", "rs"];
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "dist"];
const MAX_DESCRIPTIONS: usize = 13;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    /// Relative to the project root
    pub path: String,
    pub symbol_count: usize,
    pub exports: Vec<String>,
    pub content: String,
    pub embedding: Vec<f64>,
    /// md5 of the content, used to skip re-embedding unchanged files
    pub hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedIndex {
    files: Vec<IndexedFile>,
    indexed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Histogram of UTF-16 code units folded into 16 buckets, L2-normalised.
pub fn compute_embedding(text: &str) -> Vec<f64> {
    let mut vector = vec![0.0; EMBEDDING_DIMENSIONS];
    for (i, unit) in text.encode_utf16().enumerate() {
        vector[i % EMBEDDING_DIMENSIONS] += f64::from(unit) / 255.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    vector.into_iter().map(|v| v / norm).collect()
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(AsiatError::index("Vectors must be the same length"));
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0, 0.0), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    let denominator = if denominator == 0.0 { 1.0 } else { denominator };
    Ok(dot / denominator)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AsiatError::index(format!("Invalid pattern: {}", e)))
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
        .unwrap_or(false)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

pub struct CodeIndex {
    project_root: PathBuf,
    index_path: PathBuf,
    files: Vec<IndexedFile>,
}

impl CodeIndex {
    pub fn new(project_root: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            index_path: index_path.into(),
            files: Vec::new(),
        }
    }

    pub fn files(&self) -> &[IndexedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Load a previously persisted index. A missing file leaves the index empty.
    pub async fn load(&mut self) -> Result<()> {
        if !fs::try_exists(&self.index_path).await? {
            debug!(path = %self.index_path.display(), "No persisted index");
            return Ok(());
        }

        let raw = fs::read_to_string(&self.index_path).await?;
        let persisted: PersistedIndex = serde_json::from_str(&raw)?;
        self.files = persisted.files;
        info!(files = self.files.len(), "Loaded code index");
        Ok(())
    }

    /// Walk the project, re-embed changed files and persist the result.
    #[instrument(skip(self), fields(root = %self.project_root.display()))]
    pub async fn index_project(&mut self) -> Result<usize> {
        let previous: HashMap<String, (String, Vec<f64>)> = self
            .files
            .drain(..)
            .map(|file| (file.path, (file.hash, file.embedding)))
            .collect();

        let paths: Vec<PathBuf> = WalkDir::new(&self.project_root)
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && has_supported_extension(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        let mut files = Vec::with_capacity(paths.len());
        let mut reused = 0;

        for path in paths {
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            let relative = path
                .strip_prefix(&self.project_root)
                .unwrap_or(&path)
                .display()
                .to_string();
            let hash = format!("{:x}", md5::compute(content.as_bytes()));

            let embedding = match previous.get(&relative) {
                Some((old_hash, embedding)) if *old_hash == hash => {
                    reused += 1;
                    embedding.clone()
                }
                _ => compute_embedding(&content),
            };

            files.push(IndexedFile {
                exports: extract_exports(&path, &content),
                symbol_count: content.chars().count(),
                path: relative,
                content,
                embedding,
                hash,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        self.files = files;
        self.persist().await?;

        info!(files = self.files.len(), reused, "Indexed project");
        Ok(self.files.len())
    }

    async fn persist(&self) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedIndex {
            files: self.files.clone(),
            indexed_at: Some(chrono::Utc::now()),
        };
        fs::write(&self.index_path, serde_json::to_string(&persisted)?).await?;
        Ok(())
    }

    /// Files ranked by descending cosine similarity to the query.
    pub fn search(&self, query: &str, limit: usize) -> Vec<IndexedFile> {
        let query_embedding = compute_embedding(query);

        let mut scored: Vec<(f64, &IndexedFile)> = self
            .files
            .iter()
            .filter_map(|file| {
                cosine_similarity(&query_embedding, &file.embedding)
                    .ok()
                    .map(|score| (score, file))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(limit)
            .map(|(_, file)| file.clone())
            .collect()
    }

    /// Short list of declarations in a file, optionally narrowed to one symbol.
    pub async fn describe_file(&self, relative_path: &str, focus: Option<&str>) -> String {
        let absolute = self.project_root.join(relative_path);
        let content = match fs::read_to_string(&absolute).await {
            Ok(content) => content,
            Err(_) => return format!("No source available for {}.", relative_path),
        };

        let focus = focus.map(str::to_lowercase);
        let descriptions = if absolute.extension().and_then(|e| e.to_str()) == Some("rs") {
            describe_rust(&content, focus.as_deref())
        } else {
            describe_script(&content, focus.as_deref()).unwrap_or_default()
        };

        if descriptions.is_empty() {
            format!("No notable declarations found in {}.", relative_path)
        } else {
            descriptions.join("\n")
        }
    }
}

fn extract_exports(path: &Path, content: &str) -> Vec<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("rs") => syn::parse_file(content)
            .map(|file| {
                file.items
                    .iter()
                    .filter_map(public_item_name)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
        Some("ts" | "tsx" | "js" | "jsx") => compile(
            r"(?m)^\s*export\s+(?:default\s+)?(?:async\s+)?(?:function\*?|class|interface|const|let|var|type|enum)\s+(\w+)",
        )
        .map(|re| {
            re.captures_iter(content)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect()
        })
        .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn public_item_name(item: &syn::Item) -> Option<String> {
    let (vis, ident) = match item {
        syn::Item::Fn(f) => (&f.vis, &f.sig.ident),
        syn::Item::Struct(s) => (&s.vis, &s.ident),
        syn::Item::Enum(e) => (&e.vis, &e.ident),
        syn::Item::Trait(t) => (&t.vis, &t.ident),
        syn::Item::Const(c) => (&c.vis, &c.ident),
        syn::Item::Type(t) => (&t.vis, &t.ident),
        syn::Item::Mod(m) => (&m.vis, &m.ident),
        _ => return None,
    };
    matches!(vis, syn::Visibility::Public(_)).then(|| ident.to_string())
}

/// Collects one-line descriptions of Rust declarations
struct DeclarationVisitor<'a> {
    focus: Option<&'a str>,
    descriptions: Vec<String>,
}

impl DeclarationVisitor<'_> {
    fn push(&mut self, label: &str, name: &str, detail: String) {
        if self.descriptions.len() >= MAX_DESCRIPTIONS {
            return;
        }
        if let Some(focus) = self.focus {
            if name.to_lowercase() != focus {
                return;
            }
        }
        self.descriptions.push(format!("{}: {}", label, detail));
    }
}

fn param_names(inputs: &syn::punctuated::Punctuated<FnArg, syn::token::Comma>) -> String {
    inputs
        .iter()
        .map(|arg| match arg {
            FnArg::Receiver(_) => "self".to_string(),
            FnArg::Typed(typed) => match typed.pat.as_ref() {
                Pat::Ident(ident) => ident.ident.to_string(),
                _ => "_".to_string(),
            },
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'ast> Visit<'ast> for DeclarationVisitor<'_> {
    fn visit_item_fn(&mut self, node: &'ast ItemFn) {
        let name = node.sig.ident.to_string();
        let asyncness = if node.sig.asyncness.is_some() {
            "async "
        } else {
            ""
        };
        let detail = format!("{}{}({})", asyncness, name, param_names(&node.sig.inputs));
        self.push("function", &name, detail);
        visit::visit_item_fn(self, node);
    }

    fn visit_item_struct(&mut self, node: &'ast ItemStruct) {
        let name = node.ident.to_string();
        let fields: Vec<String> = node
            .fields
            .iter()
            .take(6)
            .filter_map(|field| field.ident.as_ref().map(|ident| ident.to_string()))
            .collect();
        self.push("struct", &name, format!("{} {{ {} }}", name, fields.join("; ")));
    }

    fn visit_item_enum(&mut self, node: &'ast ItemEnum) {
        let name = node.ident.to_string();
        let variants: Vec<String> = node
            .variants
            .iter()
            .take(6)
            .map(|variant| variant.ident.to_string())
            .collect();
        self.push("enum", &name, format!("{} {{ {} }}", name, variants.join(", ")));
    }

    fn visit_item_trait(&mut self, node: &'ast ItemTrait) {
        let name = node.ident.to_string();
        let methods: Vec<String> = node
            .items
            .iter()
            .filter_map(|item| match item {
                TraitItem::Fn(method) => Some(format!(
                    "{}({})",
                    method.sig.ident,
                    param_names(&method.sig.inputs)
                )),
                _ => None,
            })
            .take(5)
            .collect();
        self.push("trait", &name, format!("{} {{ {} }}", name, methods.join("; ")));
    }

    fn visit_item_const(&mut self, node: &'ast ItemConst) {
        let name = node.ident.to_string();
        self.push("const", &name, name.clone());
    }
}

fn describe_rust(content: &str, focus: Option<&str>) -> Vec<String> {
    let file = match syn::parse_file(content) {
        Ok(file) => file,
        Err(e) => {
            debug!(error = %e, "Rust source did not parse");
            return Vec::new();
        }
    };

    let mut visitor = DeclarationVisitor {
        focus,
        descriptions: Vec::new(),
    };
    visitor.visit_file(&file);
    visitor.descriptions
}

fn describe_script(content: &str, focus: Option<&str>) -> Result<Vec<String>> {
    let rules = [
        (
            "function",
            compile(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\*?\s*(\w+)\s*\(([^)]*)\)")?,
        ),
        (
            "class",
            compile(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(\w+)(?:\s+extends\s+([\w.]+))?")?,
        ),
        ("interface", compile(r"(?m)^\s*(?:export\s+)?interface\s+(\w+)")?),
        ("variable", compile(r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)")?),
    ];

    let mut descriptions = Vec::new();
    for (label, re) in &rules {
        for captures in re.captures_iter(content) {
            if descriptions.len() >= MAX_DESCRIPTIONS {
                return Ok(descriptions);
            }
            let Some(name) = captures.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if focus.is_some_and(|focus| name.to_lowercase() != focus) {
                continue;
            }

            let extra = captures.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let detail = match *label {
                "function" => format!("{}({})", name, extra),
                "class" if !extra.is_empty() => format!("{} extends {}", name, extra),
                _ => name.to_string(),
            };
            descriptions.push(format!("{}: {}", label, detail));
        }
    }

    Ok(descriptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn indexed_project() -> (TempDir, CodeIndex) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(
            root.join("src/lib.rs"),
            "pub struct Parser { input: String }\n\npub fn parse(input: &str) -> Parser { todo!() }\n\nenum Mode { Fast, Slow }\n",
        )
        .unwrap();
        std::fs::write(
            root.join("src/app.ts"),
            "export class App extends Base {}\nexport function start(port: number) {}\nconst VERSION = '1';\n",
        )
        .unwrap();
        std::fs::write(root.join("README.md"), "# Demo\n").unwrap();
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "ignored").unwrap();
        std::fs::write(root.join(".git/config.json"), "{}").unwrap();

        let mut index = CodeIndex::new(root, root.join(".asiat/index.json"));
        index.index_project().await.unwrap();
        (temp_dir, index)
    }

    #[test]
    fn test_embedding_is_normalised() {
        let embedding = compute_embedding("hello world");
        assert_eq!(embedding.len(), EMBEDDING_DIMENSIONS);
        let norm: f64 = embedding.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);

        assert_eq!(compute_embedding(""), vec![0.0; EMBEDDING_DIMENSIONS]);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = compute_embedding("fn main() {}");
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0]).is_err());
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]).unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_index_skips_hidden_and_vendor_dirs() {
        let (_temp_dir, index) = indexed_project().await;
        let paths: Vec<&str> = index.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/app.ts", "src/lib.rs"]);

        let lib = index.files().iter().find(|f| f.path == "src/lib.rs").unwrap();
        assert_eq!(lib.exports, vec!["Parser", "parse"]);
        let app = index.files().iter().find(|f| f.path == "src/app.ts").unwrap();
        assert_eq!(app.exports, vec!["App", "start"]);
    }

    #[tokio::test]
    async fn test_search_ranks_exact_match_first() {
        let (temp_dir, index) = indexed_project().await;
        let readme = std::fs::read_to_string(temp_dir.path().join("README.md")).unwrap();

        let results = index.search(&readme, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "README.md");
        assert!(index.search("anything", 0).is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let (temp_dir, index) = indexed_project().await;
        let mut reloaded = CodeIndex::new(temp_dir.path(), temp_dir.path().join(".asiat/index.json"));
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len(), index.len());

        // Reindexing an unchanged tree keeps the stored hash.
        let before = reloaded.files()[0].hash.clone();
        reloaded.index_project().await.unwrap();
        assert_eq!(reloaded.files()[0].hash, before);
    }

    #[tokio::test]
    async fn test_describe_rust_and_script_files() {
        let (_temp_dir, index) = indexed_project().await;

        let rust = index.describe_file("src/lib.rs", None).await;
        assert_eq!(
            rust,
            "struct: Parser { input }\nfunction: parse(input)\nenum: Mode { Fast, Slow }"
        );

        let focused = index.describe_file("src/lib.rs", Some("MODE")).await;
        assert_eq!(focused, "enum: Mode { Fast, Slow }");

        let script = index.describe_file("src/app.ts", None).await;
        assert_eq!(
            script,
            "function: start(port: number)\nclass: App extends Base\nvariable: VERSION"
        );

        let empty = index.describe_file("README.md", None).await;
        assert_eq!(empty, "No notable declarations found in README.md.");
    }

    #[test]
    fn test_describe_caps_entries() {
        let source: String = (0..20).map(|i| format!("const C{}: u8 = 0;\n", i)).collect();
        assert_eq!(describe_rust(&source, None).len(), MAX_DESCRIPTIONS);
    }
}
