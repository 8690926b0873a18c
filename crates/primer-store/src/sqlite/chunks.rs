use super::CourseStore;
use crate::error::StoreError;

/// One embedded passage, denormalized with display fields for citation.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub course_id: String,
    pub module_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub document_title: String,
    pub course_name: String,
    pub module_name: String,
}

/// Chunk fields needed for concept tagging.
#[derive(Debug)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub document_title: String,
}

/// Retrieval candidate: citation fields plus the decoded vector.
#[derive(Debug)]
pub struct EmbeddedChunk {
    pub chunk_id: String,
    pub text: String,
    pub document_title: String,
    pub course_name: String,
    pub module_name: String,
    pub embedding: Vec<f32>,
}

type CandidateRow = (String, String, String, String, String, String);

fn decode_candidate(row: CandidateRow) -> Result<EmbeddedChunk, StoreError> {
    let (chunk_id, text, document_title, course_name, module_name, embedding) = row;
    Ok(EmbeddedChunk {
        chunk_id,
        text,
        document_title,
        course_name,
        module_name,
        embedding: serde_json::from_str(&embedding)?,
    })
}

impl CourseStore {
    /// # Errors
    ///
    /// Returns an error if the embedding cannot be encoded or the insert
    /// fails.
    pub async fn insert_chunk(&self, record: &ChunkRecord) -> Result<(), StoreError> {
        let embedding = serde_json::to_string(&record.embedding)?;
        sqlx::query(
            "INSERT INTO document_chunks \
             (chunk_id, document_id, course_id, module_id, text, embedding, \
              document_title, course_name, module_name) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.chunk_id)
        .bind(&record.document_id)
        .bind(&record.course_id)
        .bind(&record.module_id)
        .bind(&record.text)
        .bind(embedding)
        .bind(&record.document_title)
        .bind(&record.course_name)
        .bind(&record.module_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop every chunk of a document ahead of re-chunking. Returns the
    /// number of removed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_chunks_for_document(&self, document_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// All chunks of a course in stable id order, for tagging.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chunks_for_course(&self, course_id: &str) -> Result<Vec<StoredChunk>, StoreError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT chunk_id, text, COALESCE(document_title, '') AS document_title \
             FROM document_chunks \
             WHERE course_id = ? \
             ORDER BY chunk_id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(chunk_id, text, document_title)| StoredChunk {
                chunk_id,
                text,
                document_title,
            })
            .collect())
    }

    /// Retrieval candidates for a course. Non-empty scope fields restrict to
    /// chunks holding an assignment that matches every supplied field;
    /// empty fields are unconstrained.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or an embedding column does not
    /// decode.
    pub async fn candidate_chunks(
        &self,
        course_id: &str,
        unit_id: &str,
        topic_id: &str,
        subtopic_id: &str,
    ) -> Result<Vec<EmbeddedChunk>, StoreError> {
        let scoped = !(unit_id.is_empty() && topic_id.is_empty() && subtopic_id.is_empty());

        let rows: Vec<CandidateRow> = if scoped {
            sqlx::query_as(
                "SELECT d.chunk_id, d.text, \
                 COALESCE(d.document_title, '') AS document_title, \
                 COALESCE(d.course_name, '') AS course_name, \
                 COALESCE(d.module_name, '') AS module_name, \
                 d.embedding \
                 FROM document_chunks d \
                 WHERE d.course_id = ? \
                   AND d.chunk_id IN ( \
                     SELECT a.chunk_id FROM chunk_assignments a \
                     WHERE (? = '' OR a.unit_id = ?) \
                       AND (? = '' OR a.topic_id = ?) \
                       AND (? = '' OR a.subtopic_id = ?))",
            )
            .bind(course_id)
            .bind(unit_id)
            .bind(unit_id)
            .bind(topic_id)
            .bind(topic_id)
            .bind(subtopic_id)
            .bind(subtopic_id)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT chunk_id, text, \
                 COALESCE(document_title, '') AS document_title, \
                 COALESCE(course_name, '') AS course_name, \
                 COALESCE(module_name, '') AS module_name, \
                 embedding \
                 FROM document_chunks \
                 WHERE course_id = ?",
            )
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(decode_candidate).collect()
    }
}
