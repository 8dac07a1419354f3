//! Scribe Session Example
//!
//! Two users edit a document while a third watches the event stream.
//!
//! Run with: cargo run --example session

use std::sync::Arc;

use scribe_core::{
    CollaborationService, DocumentType, EngineConfig, ExportFormat, Permission, SuggestionKind,
};
use scribe_storage::MemoryStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("Scribe Session Example\n");

    let storage = Arc::new(MemoryStorage::new());
    let service = CollaborationService::with_repository(EngineConfig::default(), storage.clone());

    // Alice owns the document, Bob can write, Carol can only read
    let doc = service.create_document("Launch plan", DocumentType::Doc, "alice", "Draft")?;
    let id = doc.id().clone();
    service.add_collaborator(&id, "alice", "bob", Permission::Write)?;
    service.add_collaborator(&id, "alice", "carol", Permission::Read)?;

    let mut carol = service.join(&id, "carol", "Carol")?;
    let bob = service.join(&id, "bob", "Bob")?;
    println!("Active sessions: {}", carol.active_sessions.len() + 1);

    service.update_content(&id, "bob", "Draft with a timeline")?;
    service.update_cursor(&bob.session.id, serde_json::json!({ "line": 1, "column": 12 }));

    let comment = service.add_comment(&id, "carol", "Carol", "Who signs off?", None)?;
    service.reply_to_comment(&id, &comment.id, "alice", "Alice", "Me, by Friday")?;
    service.resolve_comment(&id, &comment.id, "carol")?;

    let suggestion = service.add_suggestion(
        &id,
        "bob",
        "Bob",
        SuggestionKind::Insert,
        " and budget",
        None,
    )?;
    service.accept_suggestion(&id, &suggestion.id, "alice")?;

    let restored = service.restore_version(&id, 1, "alice")?;
    println!("Restored content: {:?} (version {})", restored.content(), restored.version());

    println!("\nEvents seen by Carol:");
    for event in carol.feed.drain() {
        println!("  {}", serde_json::to_string(&event)?);
    }

    println!("\nHistory:");
    for entry in service.version_history(&id, "alice")? {
        println!("  v{} by {}: {:?}", entry.version, entry.saved_by, entry.content);
    }

    let ticket = service.export_document(&id, "carol", ExportFormat::Pdf)?;
    println!("\nExport: {}", ticket.url);

    service.leave(&bob.session.id);
    service.leave(&carol.session.id);
    service.flush().await;

    let stats = scribe_core::DocumentRepository::stats(storage.as_ref()).await?;
    println!("\nStored documents: {}", stats.document_count);

    Ok(())
}
