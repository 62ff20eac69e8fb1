//! Translates notify events into create/move events for the processor

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::Path;
use tracing::trace;

use crate::processor::RawEvent;

/// Extract the arrivals carried by a notify event.
///
/// Only creations and the "to" side of renames are kept. Backends that
/// report paired renames also report the "to" half on its own, so
/// `RenameMode::Both` is skipped to avoid handling every move twice.
pub fn normalize(event: &Event) -> Vec<RawEvent> {
    match event.kind {
        EventKind::Create(kind) => event
            .paths
            .iter()
            .map(|path| {
                let is_directory = match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => path.is_dir(),
                };
                RawEvent::created(path, is_directory)
            })
            .collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .map(|path| moved_in(path))
            .collect(),

        // Backends without rename tracking report both sides as `Any`;
        // only the side that still exists is an arrival.
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event
            .paths
            .iter()
            .filter(|path| path.exists())
            .map(|path| moved_in(path))
            .collect(),

        _ => {
            trace!("Ignoring event kind: {:?}", event.kind);
            Vec::new()
        }
    }
}

fn moved_in(path: &Path) -> RawEvent {
    RawEvent::moved(path, path, path.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::RawEventKind;
    use std::path::PathBuf;

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_create_file_and_folder() {
        let file = normalize(&event(
            EventKind::Create(CreateKind::File),
            vec![PathBuf::from("/watch/a.stl")],
        ));
        assert_eq!(file, vec![RawEvent::created("/watch/a.stl", false)]);

        let folder = normalize(&event(
            EventKind::Create(CreateKind::Folder),
            vec![PathBuf::from("/watch/batch")],
        ));
        assert_eq!(folder, vec![RawEvent::created("/watch/batch", true)]);
    }

    #[test]
    fn test_create_any_checks_the_filesystem() {
        let temp = tempfile::tempdir().unwrap();
        let events = normalize(&event(
            EventKind::Create(CreateKind::Any),
            vec![temp.path().to_path_buf()],
        ));
        assert_eq!(events.len(), 1);
        assert!(events[0].is_directory);
    }

    #[test]
    fn test_rename_to_is_a_move() {
        let events = normalize(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            vec![PathBuf::from("/watch/moved.pts")],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RawEventKind::Move);
        assert_eq!(events[0].arrival_path(), Path::new("/watch/moved.pts"));
    }

    #[test]
    fn test_rename_any_keeps_existing_side_only() {
        let temp = tempfile::tempdir().unwrap();
        let present = temp.path().join("here.stl");
        std::fs::write(&present, "x").unwrap();

        let events = normalize(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            vec![temp.path().join("gone.stl"), present.clone()],
        ));

        assert_eq!(events, vec![RawEvent::moved(&present, &present, false)]);
    }

    #[test]
    fn test_other_events_ignored() {
        for kind in [
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            EventKind::Modify(ModifyKind::Any),
            EventKind::Remove(notify::event::RemoveKind::File),
        ] {
            let events = normalize(&event(kind, vec![PathBuf::from("/watch/a.stl")]));
            assert!(events.is_empty(), "{kind:?}");
        }
    }
}
