//! Local directory course source: maps a folder of text files onto a
//! [`CourseInput`]. An optional `syllabus.*` file at the root becomes the
//! syllabus document, first-level subdirectories become modules, and every
//! `.md`/`.txt` file becomes a page document.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::ingest::{CourseInput, DocumentInput, ModuleInput};

/// Build a [`CourseInput`] from `root`. Hidden and gitignored files are
/// skipped; files nested deeper than one directory attach to the top-level
/// module. Output is sorted for deterministic ingestion. Only the first
/// root-level `syllabus.*` file becomes the syllabus; files whose slugs
/// collide get numbered suffixes.
///
/// # Errors
///
/// Returns an error if `root` is not a directory or a file cannot be read.
pub fn load_course_dir(root: &Path, course_id: &str, course_name: &str) -> Result<CourseInput> {
    if !root.is_dir() {
        return Err(RagError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("course directory not found: {}", root.display()),
        )));
    }

    let mut files: Vec<PathBuf> = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && is_course_text(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let display_name = if course_name.trim().is_empty() {
        course_id
    } else {
        course_name.trim()
    };

    let mut modules: BTreeMap<String, String> = BTreeMap::new();
    let mut documents = Vec::new();
    let mut used_ids: HashSet<String> = HashSet::new();
    let mut syllabus_seen = false;

    for path in &files {
        let rel = path.strip_prefix(root).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some(file_name) = parts.last() else {
            continue;
        };
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if parts.len() == 1 && stem.eq_ignore_ascii_case("syllabus") && !syllabus_seen {
            syllabus_seen = true;
            documents.push(DocumentInput {
                document_id: format!("syllabus_{course_id}"),
                module_id: String::new(),
                document_type: "syllabus".into(),
                title: format!("Syllabus: {display_name}"),
                raw_text: std::fs::read_to_string(path)?,
            });
            continue;
        }

        let module_id = if parts.len() > 1 {
            let dir_name = &parts[0];
            let id = slugify(dir_name);
            modules
                .entry(id.clone())
                .or_insert_with(|| dir_name.clone());
            id
        } else {
            String::new()
        };

        let slug = slugify(&rel.with_extension("").to_string_lossy());
        documents.push(DocumentInput {
            document_id: unique_id(format!("page_{course_id}_{slug}"), &mut used_ids),
            module_id,
            document_type: "page".into(),
            title: stem,
            raw_text: std::fs::read_to_string(path)?,
        });
    }

    documents.sort_by(|a, b| a.document_id.cmp(&b.document_id));

    Ok(CourseInput {
        course_id: course_id.to_owned(),
        course_name: display_name.to_owned(),
        modules: modules
            .into_iter()
            .map(|(module_id, module_name)| ModuleInput {
                module_id,
                module_name,
            })
            .collect(),
        documents,
    })
}

fn is_course_text(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "md" | "markdown" | "txt"))
}

/// First use of an id keeps it; later collisions get `-2`, `-3`, ...
/// suffixes.
fn unique_id(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Lowercase ascii alphanumerics, everything else collapsed to single
/// dashes, no leading or trailing dash.
fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut last_dash = true;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn loads_syllabus_modules_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "syllabus.md", "Week 1: cells. Week 2: genetics.");
        write(dir.path(), "notes.md", "General notes.");
        write(dir.path(), "Week 1/Cell Structure.md", "Cells have organelles.");
        write(dir.path(), "Week 1/membranes.txt", "Membranes are lipid bilayers.");

        let input = load_course_dir(dir.path(), "c1", "Biology").unwrap();

        assert_eq!(input.course_id, "c1");
        assert_eq!(input.course_name, "Biology");
        assert_eq!(input.modules.len(), 1);
        assert_eq!(input.modules[0].module_id, "week-1");
        assert_eq!(input.modules[0].module_name, "Week 1");

        assert_eq!(input.documents.len(), 4);
        let syllabus = input
            .documents
            .iter()
            .find(|d| d.document_type == "syllabus")
            .unwrap();
        assert_eq!(syllabus.document_id, "syllabus_c1");
        assert_eq!(syllabus.title, "Syllabus: Biology");
        assert_eq!(syllabus.module_id, "");

        let page = input
            .documents
            .iter()
            .find(|d| d.document_id == "page_c1_week-1-cell-structure")
            .unwrap();
        assert_eq!(page.module_id, "week-1");
        assert_eq!(page.title, "Cell Structure");
        assert_eq!(page.raw_text, "Cells have organelles.");

        let loose = input
            .documents
            .iter()
            .find(|d| d.document_id == "page_c1_notes")
            .unwrap();
        assert_eq!(loose.module_id, "");
    }

    #[test]
    fn skips_unsupported_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "slides.pdf", "binary-ish");
        write(dir.path(), "data.csv", "a,b");
        write(dir.path(), ".draft.md", "hidden");
        write(dir.path(), "real.md", "kept");

        let input = load_course_dir(dir.path(), "c1", "Biology").unwrap();
        let ids: Vec<&str> = input
            .documents
            .iter()
            .map(|d| d.document_id.as_str())
            .collect();
        assert_eq!(ids, ["page_c1_real"]);
    }

    #[test]
    fn nested_files_attach_to_top_level_module() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Week 1/labs/lab-2.md", "Lab two.");

        let input = load_course_dir(dir.path(), "c1", "Biology").unwrap();
        assert_eq!(input.documents.len(), 1);
        assert_eq!(input.documents[0].module_id, "week-1");
        assert_eq!(input.documents[0].document_id, "page_c1_week-1-labs-lab-2");
    }

    #[test]
    fn colliding_file_stems_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Week 1/notes.md", "Markdown notes.");
        write(dir.path(), "Week 1/notes.txt", "Plain notes.");

        let input = load_course_dir(dir.path(), "c1", "Biology").unwrap();

        assert_eq!(input.documents.len(), 2);
        let md = input
            .documents
            .iter()
            .find(|d| d.document_id == "page_c1_week-1-notes")
            .unwrap();
        assert_eq!(md.raw_text, "Markdown notes.");
        let txt = input
            .documents
            .iter()
            .find(|d| d.document_id == "page_c1_week-1-notes-2")
            .unwrap();
        assert_eq!(txt.raw_text, "Plain notes.");
    }

    #[test]
    fn only_first_syllabus_file_is_the_syllabus() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "syllabus.md", "The real syllabus.");
        write(dir.path(), "syllabus.txt", "A stray copy.");

        let input = load_course_dir(dir.path(), "c1", "Biology").unwrap();

        let syllabi: Vec<_> = input
            .documents
            .iter()
            .filter(|d| d.document_type == "syllabus")
            .collect();
        assert_eq!(syllabi.len(), 1);
        assert_eq!(syllabi[0].raw_text, "The real syllabus.");
        // The stray copy survives as an ordinary page.
        let page = input
            .documents
            .iter()
            .find(|d| d.document_id == "page_c1_syllabus")
            .unwrap();
        assert_eq!(page.raw_text, "A stray copy.");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = load_course_dir(Path::new("/nonexistent/course"), "c1", "Biology").unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
    }

    #[test]
    fn blank_course_name_falls_back_to_id() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "syllabus.txt", "Text.");

        let input = load_course_dir(dir.path(), "c1", "  ").unwrap();
        assert_eq!(input.course_name, "c1");
        assert_eq!(input.documents[0].title, "Syllabus: c1");
    }

    #[test]
    fn slugify_collapses_runs_and_lowercases() {
        assert_eq!(slugify("Week 1/Cell Structure"), "week-1-cell-structure");
        assert_eq!(slugify("Hello__World"), "hello-world");
        assert_eq!(slugify("  already-fine  "), "already-fine");
        assert_eq!(slugify("???"), "");
    }
}
