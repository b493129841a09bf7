//! Player scenarios against a manual pipeline
//!
//! Every test drives the real backend, queue and state machine; only the
//! media framework and the database are replaced.

mod common;

use common::Rig;
use tome_core::{PositionData, StreamTime};
use tome_playback::{
    PipelineState, PlaybackError, PlayerConfig, PlayerEvent, SeekAmount, StateTag,
};

fn secs(value: i64) -> StreamTime {
    StreamTime::from_secs(value)
}

// ===== Loading =====

#[tokio::test]
async fn loading_an_empty_playlist_fails_without_transition() {
    let mut rig = Rig::new();
    let book = rig.library.add_playlist("Empty", Vec::<String>::new());

    let err = rig.player.load_playlist(book.playlist_id()).await.unwrap_err();

    assert!(matches!(err, PlaybackError::EmptyPlaylist(id) if id == book.playlist_id()));
    assert_eq!(rig.player.state_tag(), StateTag::NoPlaylistLoaded);
    assert!(rig.drain_events().is_empty());
    assert!(rig.pipeline.calls().is_empty());
}

#[tokio::test]
async fn loading_a_missing_playlist_fails() {
    let mut rig = Rig::new();

    let err = rig
        .player
        .load_playlist(tome_core::PlaylistId::new(42))
        .await
        .unwrap_err();

    assert!(matches!(err, PlaybackError::PlaylistNotFound(_)));
    assert_eq!(rig.player.state_tag(), StateTag::NoPlaylistLoaded);
}

#[tokio::test]
async fn load_enters_paused_and_learns_duration() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 8]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();

    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    let events = rig.drain_events();
    assert!(matches!(&events[0], PlayerEvent::PlaylistLoaded(loaded) if *loaded == book));
    assert!(matches!(&events[1], PlayerEvent::StreamUpdated(stream) if stream.duration.is_none()));
    assert_eq!(events[2], PlayerEvent::EnterState(StateTag::Paused));

    rig.settle().await;

    let stream = rig.player.stream().unwrap();
    assert_eq!(stream.track_number, 0);
    assert_eq!(stream.duration, Some(secs(10)));
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));
    assert!(rig.player.queue().is_idle());
    assert!(rig
        .drain_events()
        .iter()
        .any(|event| matches!(event, PlayerEvent::StreamUpdated(s) if s.duration == Some(secs(10)))));
}

#[tokio::test]
async fn load_resumes_from_saved_position() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 10, 10]);
    let track = book.track(1).unwrap().clone();
    rig.library.set_position(PositionData {
        time: secs(4),
        playlist_id: book.playlist_id(),
        pl_track_id: track.pl_track_id,
    });

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;

    let stream = rig.player.stream().unwrap();
    assert_eq!(stream.track_number, 1);
    assert_eq!(stream.start_position(), secs(4));
    assert_eq!(stream.last_saved_position, secs(4));
    assert_eq!(rig.pipeline.current_path(), Some(track.file_path));
    assert_eq!(rig.pipeline.seeks(), vec![secs(4)]);
    assert_eq!(rig.pipeline.position(), Some(secs(4)));
}

#[tokio::test]
async fn loading_another_playlist_saves_and_replaces() {
    let mut rig = Rig::new();
    let first = rig.add_book("first", &[20]);
    let second = rig.add_book("second", &[20]);

    rig.player.load_playlist(first.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;
    rig.player
        .handle_backend_event(tome_playback::BackendEvent::TimeUpdated(secs(12)))
        .await
        .unwrap();

    rig.player.load_playlist(second.playlist_id()).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    assert_eq!(rig.player.book().unwrap().playlist_id(), second.playlist_id());
    assert_eq!(rig.library.position(first.playlist_id()).unwrap().time, secs(12));
    assert_eq!(
        rig.pipeline.created(),
        vec![
            first.track(0).unwrap().file_path.clone(),
            second.track(0).unwrap().file_path.clone()
        ]
    );
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));
}

#[tokio::test]
async fn loading_another_playlist_before_the_first_settles() {
    let mut rig = Rig::new();
    let first = rig.add_book("first", &[20]);
    let second = rig.add_book("second", &[30]);

    rig.player.load_playlist(first.playlist_id()).await.unwrap();
    rig.player.load_playlist(second.playlist_id()).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.player.book().unwrap().playlist_id(), second.playlist_id());
    assert_eq!(rig.player.stream().unwrap().duration, Some(secs(30)));
    let second_file = second.track(0).unwrap().file_path.clone();
    assert_eq!(rig.pipeline.created().last(), Some(&second_file));
    assert_eq!(rig.pipeline.current_path(), Some(second_file));
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));
    assert!(rig.player.queue().is_idle());
}

#[tokio::test]
async fn failed_save_keeps_current_playlist() {
    let mut rig = Rig::new();
    let first = rig.add_book("first", &[20]);
    let second = rig.add_book("second", &[20]);

    rig.player.load_playlist(first.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.library.fail_saves(true);

    let err = rig.player.load_playlist(second.playlist_id()).await.unwrap_err();

    assert!(matches!(err, PlaybackError::Storage(_)));
    assert_eq!(rig.player.book().unwrap().playlist_id(), first.playlist_id());
    assert_eq!(rig.pipeline.created().len(), 1);
}

// ===== Track changes =====

#[tokio::test]
async fn end_of_stream_advances_and_finishes_on_last_track() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 8]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;
    rig.drain_events();

    // First track ends: keep playing the second one
    assert!(rig.pipeline.finish_stream());
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::Playing);
    let stream = rig.player.stream().unwrap();
    assert_eq!(stream.track_number, 1);
    assert_eq!(stream.duration, Some(secs(8)));
    assert_eq!(rig.pipeline.current_path(), Some(book.track(1).unwrap().file_path.clone()));
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Playing));
    assert!(!rig.drain_events().contains(&PlayerEvent::PlaylistFinished));
    assert_eq!(rig.library.save_count(), 0);

    // Last track ends: rewind to the first track, paused
    assert!(rig.pipeline.finish_stream());
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    let stream = rig.player.stream().unwrap();
    assert_eq!(stream.track_number, 0);
    assert_eq!(stream.start_position(), StreamTime::ZERO);
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));

    let events = rig.drain_events();
    assert_eq!(
        events
            .iter()
            .filter(|event| **event == PlayerEvent::PlaylistFinished)
            .count(),
        1
    );
    assert!(events.contains(&PlayerEvent::EnterState(StateTag::Paused)));

    assert_eq!(rig.library.save_count(), 1);
    assert_eq!(
        rig.library.position(book.playlist_id()),
        Some(PositionData::start_of(
            book.playlist_id(),
            book.track(0).unwrap().pl_track_id
        ))
    );
}

#[tokio::test]
async fn single_track_playlist_finishes_immediately() {
    let mut rig = Rig::new();
    let book = rig.add_book("short", &[5]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;
    rig.drain_events();

    rig.pipeline.finish_stream();
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    assert!(rig.drain_events().contains(&PlayerEvent::PlaylistFinished));
}

#[tokio::test]
async fn transport_between_end_of_stream_and_next_track() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 8]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;

    // The stream is gone but the player has not seen the end yet
    rig.player
        .handle_pipeline_message(tome_playback::PipelineMessage::Eos)
        .unwrap();
    assert!(rig.player.go_to_position(secs(3)).unwrap());
    rig.player.pause().unwrap();
    assert_eq!(rig.player.state_tag(), StateTag::Paused);

    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    assert_eq!(rig.player.stream().unwrap().track_number, 1);
    assert_eq!(rig.pipeline.current_path(), Some(book.track(1).unwrap().file_path.clone()));
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));
    assert!(!rig.pipeline.seeks().contains(&secs(3)));
    assert!(rig.player.queue().is_idle());
}

#[tokio::test]
async fn set_track_relative_wraps_both_ways() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 10, 10]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.player.set_track_relative(-1).unwrap(), Some(2));
    rig.settle().await;
    assert_eq!(rig.pipeline.current_path(), Some(book.track(2).unwrap().file_path.clone()));

    assert_eq!(rig.player.set_track_relative(2).unwrap(), Some(1));
    rig.settle().await;
    assert_eq!(rig.player.stream().unwrap().track_number, 1);
    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));
}

#[tokio::test]
async fn set_track_while_playing_keeps_playing() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 10]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;

    rig.player.set_track(1).unwrap();
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::Playing);
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Playing));
    assert_eq!(rig.pipeline.current_path(), Some(book.track(1).unwrap().file_path.clone()));
}

#[tokio::test]
async fn track_changes_before_the_load_settles() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 8, 6]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.player.set_track_relative(1).unwrap(), Some(1));
    assert_eq!(rig.player.set_track_relative(1).unwrap(), Some(2));
    rig.settle().await;

    let stream = rig.player.stream().unwrap();
    assert_eq!(stream.track_number, 2);
    assert_eq!(stream.duration, Some(secs(6)));
    assert_eq!(rig.pipeline.current_path(), Some(book.track(2).unwrap().file_path.clone()));
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));
    assert!(rig.player.queue().is_idle());
}

#[tokio::test]
async fn track_changes_while_playing_before_the_load_settles() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10, 8, 6]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;

    rig.player.set_track_relative(1).unwrap();
    rig.player.set_track_relative(1).unwrap();
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::Playing);
    assert_eq!(rig.pipeline.current_path(), Some(book.track(2).unwrap().file_path.clone()));
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Playing));
    assert!(rig.player.queue().is_idle());
}

#[tokio::test]
async fn set_track_out_of_range_is_an_error() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;

    assert!(matches!(
        rig.player.set_track(3),
        Err(PlaybackError::TrackNotFound { track_number: 3, .. })
    ));
    assert_eq!(rig.player.stream().unwrap().track_number, 0);
}

// ===== Seeking =====

#[tokio::test]
async fn go_to_position_accepts_only_inside_the_stream() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[10]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();

    // Duration not known yet
    assert!(!rig.player.go_to_position(secs(5)).unwrap());

    rig.settle().await;
    assert!(!rig.player.go_to_position(StreamTime::ZERO).unwrap());
    assert!(!rig.player.go_to_position(secs(-1)).unwrap());
    assert!(!rig.player.go_to_position(secs(10)).unwrap());
    assert!(!rig.player.go_to_position(secs(11)).unwrap());
    assert!(rig.pipeline.seeks().is_empty());

    assert!(rig.player.go_to_position(secs(5)).unwrap());
    rig.settle().await;

    assert_eq!(rig.pipeline.seeks(), vec![secs(5)]);
    assert_eq!(rig.pipeline.position(), Some(secs(5)));
}

#[tokio::test]
async fn seeks_issued_while_busy_collapse_to_the_latest() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[60]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.pipeline.set_auto_complete(false);

    assert!(rig.player.go_to_position(secs(30)).unwrap());
    assert!(rig.player.go_to_position(secs(40)).unwrap());
    assert!(rig.player.go_to_position(secs(50)).unwrap());
    // Relative to the pending target, not the stream
    assert!(rig.player.seek(SeekAmount::ForwardShort).unwrap());
    assert_eq!(rig.player.queue().len(), 1);

    rig.pipeline.complete_pending();
    rig.settle().await;
    rig.pipeline.complete_pending();
    rig.settle().await;

    assert_eq!(rig.pipeline.seeks(), vec![secs(30), secs(55)]);
    assert!(rig.player.queue().is_idle());
}

#[tokio::test]
async fn relative_seek_outside_the_stream_is_rejected() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[60]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;

    assert!(!rig.player.seek(SeekAmount::ReverseShort).unwrap());
    assert!(rig.player.seek(SeekAmount::ForwardLong).unwrap());
    rig.settle().await;
    assert!(rig.player.seek(SeekAmount::ForwardShort).unwrap());
    rig.settle().await;
    assert!(!rig.player.seek(SeekAmount::ForwardLong).unwrap());

    assert_eq!(rig.pipeline.seeks(), vec![secs(30), secs(35)]);
}

#[tokio::test]
async fn stop_pauses_then_rewinds() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[60]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;
    assert!(rig.player.go_to_position(secs(20)).unwrap());
    rig.settle().await;

    rig.player.stop().unwrap();
    rig.settle().await;
    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Paused));
    assert_eq!(rig.pipeline.position(), Some(secs(20)));

    rig.drain_events();
    rig.player.stop().unwrap();
    rig.settle().await;
    assert_eq!(rig.player.state_tag(), StateTag::Paused);
    assert_eq!(rig.pipeline.position(), Some(StreamTime::ZERO));
    assert_eq!(rig.player.stream().unwrap().position_data.time, StreamTime::ZERO);
    assert!(rig
        .drain_events()
        .contains(&PlayerEvent::PositionUpdated(StreamTime::ZERO)));
}

// ===== Checkpoints =====

#[tokio::test]
async fn checkpoint_saved_once_per_interval() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[600]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;

    for second in 1..30 {
        rig.player
            .handle_backend_event(tome_playback::BackendEvent::TimeUpdated(secs(second)))
            .await
            .unwrap();
    }
    assert_eq!(rig.library.save_count(), 0);

    rig.player
        .handle_backend_event(tome_playback::BackendEvent::TimeUpdated(secs(30)))
        .await
        .unwrap();
    assert_eq!(rig.library.save_count(), 1);
    assert_eq!(rig.library.saved_positions()[0].time, secs(30));
    assert_eq!(rig.player.stream().unwrap().last_saved_position, secs(30));

    for second in 31..60 {
        rig.player
            .handle_backend_event(tome_playback::BackendEvent::TimeUpdated(secs(second)))
            .await
            .unwrap();
    }
    assert_eq!(rig.library.save_count(), 1);

    let updates = rig
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, PlayerEvent::PositionUpdated(_)))
        .count();
    assert_eq!(updates, 59);
}

#[tokio::test]
async fn checkpoint_interval_comes_from_config() {
    let config = PlayerConfig {
        checkpoint_interval_secs: 5,
        ..PlayerConfig::default()
    };
    let mut rig = Rig::with_config(config);
    let book = rig.add_book("dune", &[600]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;

    for second in 1..=10 {
        rig.player
            .handle_backend_event(tome_playback::BackendEvent::TimeUpdated(secs(second)))
            .await
            .unwrap();
    }

    let saved: Vec<_> = rig
        .library
        .saved_positions()
        .into_iter()
        .map(|position| position.time)
        .collect();
    assert_eq!(saved, vec![secs(5), secs(10)]);
}

#[tokio::test]
async fn unload_saves_position() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[60]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player
        .handle_backend_event(tome_playback::BackendEvent::TimeUpdated(secs(7)))
        .await
        .unwrap();
    rig.drain_events();

    rig.player.unload_playlist().await.unwrap();
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::NoPlaylistLoaded);
    assert!(rig.player.stream().is_none());
    assert_eq!(rig.library.position(book.playlist_id()).unwrap().time, secs(7));
    assert_eq!(rig.pipeline.current_path(), None);
    assert_eq!(
        rig.drain_events(),
        vec![
            PlayerEvent::EnterState(StateTag::NoPlaylistLoaded),
            PlayerEvent::PlaylistUnloaded
        ]
    );
}

#[tokio::test]
async fn unload_without_save_when_disabled() {
    let config = PlayerConfig {
        save_on_unload: false,
        ..PlayerConfig::default()
    };
    let mut rig = Rig::with_config(config);
    let book = rig.add_book("dune", &[60]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.player.unload_playlist().await.unwrap();

    assert_eq!(rig.library.save_count(), 0);
    assert_eq!(rig.player.state_tag(), StateTag::NoPlaylistLoaded);
}

// ===== State guards =====

#[tokio::test]
async fn operations_without_playlist_are_ignored() {
    let mut rig = Rig::new();

    rig.player.play().unwrap();
    rig.player.pause().unwrap();
    rig.player.stop().unwrap();
    rig.player.set_track(0).unwrap();
    assert_eq!(rig.player.set_track_relative(1).unwrap(), None);
    assert!(!rig.player.seek(SeekAmount::ForwardLong).unwrap());
    assert!(!rig.player.go_to_position(secs(1)).unwrap());
    rig.player.unload_playlist().await.unwrap();
    assert!(!rig.player.save_position().await.unwrap());
    rig.settle().await;

    assert_eq!(rig.player.state_tag(), StateTag::NoPlaylistLoaded);
    assert!(rig.pipeline.calls().is_empty());
    assert!(rig.drain_events().is_empty());
}

#[tokio::test]
async fn play_and_pause_only_act_in_their_state() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[60]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.pipeline.clear_calls();

    rig.player.pause().unwrap();
    rig.settle().await;
    assert!(rig.pipeline.calls().is_empty());

    rig.player.play().unwrap();
    rig.settle().await;
    rig.player.play().unwrap();
    rig.settle().await;
    assert_eq!(rig.pipeline.state_requests(PipelineState::Playing), 1);
    assert_eq!(rig.player.state_tag(), StateTag::Playing);

    rig.player.pause().unwrap();
    rig.settle().await;
    assert_eq!(rig.pipeline.state_requests(PipelineState::Paused), 1);
    assert_eq!(rig.player.state_tag(), StateTag::Paused);
}

#[tokio::test]
async fn play_before_load_completes_waits_for_ready() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[60]);
    rig.pipeline.set_auto_complete(false);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.player.play().unwrap();
    assert_eq!(rig.player.state_tag(), StateTag::Playing);
    assert_eq!(rig.pipeline.state_requests(PipelineState::Playing), 0);

    rig.pipeline.complete_pending();
    rig.settle().await;
    rig.pipeline.complete_pending();
    rig.settle().await;

    assert_eq!(rig.pipeline.state_requests(PipelineState::Playing), 1);
    assert_eq!(rig.pipeline.current_state(), Some(PipelineState::Playing));
    assert!(rig.player.queue().is_idle());
}

#[tokio::test]
async fn pipeline_errors_reach_subscribers() {
    let mut rig = Rig::new();
    let book = rig.add_book("dune", &[60]);

    rig.player.load_playlist(book.playlist_id()).await.unwrap();
    rig.settle().await;
    rig.drain_events();

    assert!(rig.pipeline.post_error("decoder failed"));
    rig.settle().await;

    assert_eq!(
        rig.drain_events(),
        vec![PlayerEvent::Error {
            message: "decoder failed".to_string()
        }]
    );
    assert_eq!(rig.player.state_tag(), StateTag::Paused);
}
