use serde::Serialize;

use super::CourseStore;
use crate::error::StoreError;

/// One source artifact from the course platform, replaced wholesale on
/// re-ingestion.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: String,
    pub course_id: String,
    /// "uncategorized" when the document belongs to no module.
    pub module_id: String,
    /// One of "syllabus", "assignment", "page", "file".
    pub document_type: String,
    pub title: String,
    pub raw_text: String,
}

#[derive(Debug, Serialize)]
pub struct ModuleOverview {
    pub module_id: String,
    pub module_name: String,
    pub document_count: i64,
    pub chunk_count: i64,
}

impl CourseStore {
    /// Keyed upsert: create the course or refresh its display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_course(&self, course_id: &str, course_name: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO courses (course_id, course_name) VALUES (?, ?) \
             ON CONFLICT(course_id) DO UPDATE SET course_name = excluded.course_name",
        )
        .bind(course_id)
        .bind(course_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_module(
        &self,
        module_id: &str,
        course_id: &str,
        module_name: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO modules (module_id, course_id, module_name) VALUES (?, ?, ?) \
             ON CONFLICT(module_id) DO UPDATE SET \
             module_name = excluded.module_name, course_id = excluded.course_id",
        )
        .bind(module_id)
        .bind(course_id)
        .bind(module_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last-write-wins document upsert; chunks for the document are managed
    /// separately by the ingestor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_document(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents \
             (document_id, course_id, module_id, document_type, title, raw_text) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(document_id) DO UPDATE SET \
             raw_text = excluded.raw_text, \
             title = excluded.title, \
             module_id = excluded.module_id, \
             updated_at = datetime('now')",
        )
        .bind(&record.document_id)
        .bind(&record.course_id)
        .bind(&record.module_id)
        .bind(&record.document_type)
        .bind(&record.title)
        .bind(&record.raw_text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Course display name, empty string when unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn course_name(&self, course_id: &str) -> Result<String, StoreError> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT course_name FROM courses WHERE course_id = ? LIMIT 1")
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name.unwrap_or_default().trim().to_owned())
    }

    /// Raw text of the course's syllabus document, `None` when absent or
    /// blank.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn syllabus_text(&self, course_id: &str) -> Result<Option<String>, StoreError> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT raw_text FROM documents \
             WHERE course_id = ? AND document_type = 'syllabus' \
             LIMIT 1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(raw
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty()))
    }

    /// Per-module document and chunk counts for status reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn module_overview(&self, course_id: &str) -> Result<Vec<ModuleOverview>, StoreError> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            "SELECT m.module_id, COALESCE(m.module_name, '') AS module_name, \
             COUNT(DISTINCT d.document_id) AS document_count, \
             COUNT(c.chunk_id) AS chunk_count \
             FROM modules m \
             LEFT JOIN documents d ON d.course_id = m.course_id AND d.module_id = m.module_id \
             LEFT JOIN document_chunks c ON c.document_id = d.document_id \
             WHERE m.course_id = ? \
             GROUP BY m.module_id, m.module_name \
             ORDER BY m.module_id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(module_id, module_name, document_count, chunk_count)| ModuleOverview {
                module_id,
                module_name,
                document_count,
                chunk_count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::ChunkRecord;

    async fn test_store() -> CourseStore {
        CourseStore::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_course_refreshes_name() {
        let store = test_store().await;
        store.upsert_course("c1", "Biology").await.unwrap();
        store.upsert_course("c1", "Biology 101").await.unwrap();

        assert_eq!(store.course_name("c1").await.unwrap(), "Biology 101");
    }

    #[tokio::test]
    async fn course_name_empty_when_unknown() {
        let store = test_store().await;
        assert_eq!(store.course_name("missing").await.unwrap(), "");
    }

    #[tokio::test]
    async fn upsert_document_replaces_text() {
        let store = test_store().await;
        store.upsert_course("c1", "Biology").await.unwrap();

        let mut doc = DocumentRecord {
            document_id: "d1".into(),
            course_id: "c1".into(),
            module_id: String::new(),
            document_type: "page".into(),
            title: "Cells".into(),
            raw_text: "v1".into(),
        };
        store.upsert_document(&doc).await.unwrap();
        doc.raw_text = "v2".into();
        store.upsert_document(&doc).await.unwrap();

        let (raw, updated): (String, Option<String>) =
            sqlx::query_as("SELECT raw_text, updated_at FROM documents WHERE document_id = 'd1'")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(raw, "v2");
        assert!(updated.is_some());
    }

    #[tokio::test]
    async fn syllabus_text_trims_and_skips_blank() {
        let store = test_store().await;
        store.upsert_course("c1", "Biology").await.unwrap();

        assert!(store.syllabus_text("c1").await.unwrap().is_none());

        store
            .upsert_document(&DocumentRecord {
                document_id: "syl".into(),
                course_id: "c1".into(),
                module_id: String::new(),
                document_type: "syllabus".into(),
                title: "Syllabus".into(),
                raw_text: "   \n  ".into(),
            })
            .await
            .unwrap();
        assert!(store.syllabus_text("c1").await.unwrap().is_none());

        store
            .upsert_document(&DocumentRecord {
                document_id: "syl".into(),
                course_id: "c1".into(),
                module_id: String::new(),
                document_type: "syllabus".into(),
                title: "Syllabus".into(),
                raw_text: "  Week 1: Cells  ".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            store.syllabus_text("c1").await.unwrap().unwrap(),
            "Week 1: Cells"
        );
    }

    #[tokio::test]
    async fn module_overview_counts_documents_and_chunks() {
        let store = test_store().await;
        store.upsert_course("c1", "Biology").await.unwrap();
        store.upsert_module("m1", "c1", "Unit One").await.unwrap();
        store.upsert_module("m2", "c1", "Unit Two").await.unwrap();

        store
            .upsert_document(&DocumentRecord {
                document_id: "d1".into(),
                course_id: "c1".into(),
                module_id: "m1".into(),
                document_type: "page".into(),
                title: "Cells".into(),
                raw_text: "text".into(),
            })
            .await
            .unwrap();
        for i in 0..3 {
            store
                .insert_chunk(&ChunkRecord {
                    chunk_id: format!("ch{i}"),
                    document_id: "d1".into(),
                    course_id: "c1".into(),
                    module_id: "m1".into(),
                    text: "passage".into(),
                    embedding: vec![0.0, 1.0],
                    document_title: "Cells".into(),
                    course_name: "Biology".into(),
                    module_name: "Unit One".into(),
                })
                .await
                .unwrap();
        }

        let overview = store.module_overview("c1").await.unwrap();
        assert_eq!(overview.len(), 2);
        assert_eq!(overview[0].module_id, "m1");
        assert_eq!(overview[0].document_count, 1);
        assert_eq!(overview[0].chunk_count, 3);
        assert_eq!(overview[1].module_id, "m2");
        assert_eq!(overview[1].document_count, 0);
        assert_eq!(overview[1].chunk_count, 0);
    }
}
