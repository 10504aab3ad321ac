use std::time::{Duration, Instant};

use typewire::fonts::{BoxTypeface, StyleTable};
use typewire::layout::LayoutContext;
use typewire::markup::LineKind;
use typewire::render::Frame;
use typewire::{MemorySink, Pacing, SessionConfig, SessionState, StreamSession};

fn config() -> SessionConfig {
    let mut config = SessionConfig::headless(1280, 720);
    config.fps = 10;
    config
}

fn session_with(config: SessionConfig, sink: MemorySink) -> StreamSession<MemorySink> {
    StreamSession::with_parts(config, BoxTypeface, sink)
        .expect("session should assemble")
        .with_pacing(Pacing::Unpaced)
}

fn first_ink_row(frame: &Frame, background: [u8; 3]) -> Option<u32> {
    (0..frame.height).find(|y| (0..frame.width).any(|x| frame.pixel(x, *y)[..3] != background[..]))
}

#[test]
fn heading_and_body_fit_in_one_tick() {
    let text = "# Dublin\nDublin is the capital of Ireland.";
    let config = config();
    let background = config.colors.background;
    let mut session = session_with(config, MemorySink::new());

    let summary = session.render_block(text, Some(1000.0)).unwrap();

    let max_ticks = (text.chars().count() as f64 / 100.0).ceil() as u64;
    assert!(summary.ticks <= max_ticks, "took {} ticks", summary.ticks);
    assert_eq!(summary.frames, summary.ticks);
    assert!(!summary.cancelled);
    assert_eq!(summary.final_offset, 0.0);
    assert_eq!(session.scroll_offset(), 0.0);

    let visible = session.visible_lines();
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[0].kind, LineKind::Heading(1));
    assert_eq!(visible[0].text(), "Dublin");
    assert_eq!(visible[1].kind, LineKind::Body);
    assert_eq!(visible[1].text(), "Dublin is the capital of Ireland.");
    assert!(visible[0].height > visible[1].height);

    let frame = session.sink().last_frame().expect("one frame");
    assert_eq!(first_ink_row(frame, background), Some(50));
}

#[test]
fn idle_interval_truncates_once() {
    let config = config();
    let background = config.colors.background;
    let mut session = session_with(config, MemorySink::new());

    let summary = session
        .display_idle(Some(Duration::from_millis(2550)))
        .unwrap();
    assert_eq!(summary.frames, 25);
    assert_eq!(session.sink().presented(), 25);
    assert!(session
        .sink()
        .frames()
        .iter()
        .all(|frame| first_ink_row(frame, background).is_none()));

    let summary = session.display_idle(None).unwrap();
    assert_eq!(summary.frames, 20);
}

#[test]
fn empty_text_renders_nothing() {
    let mut session = session_with(config(), MemorySink::new());
    let summary = session.render_block("", None).unwrap();
    assert_eq!(summary.frames, 0);
    assert_eq!(session.sink().presented(), 0);
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn over_wide_word_is_split_into_fitting_fragments() {
    let config = config();
    let width = config.text_width();
    let styles = StyleTable::from_config(&config.fonts);
    let word = "x".repeat(100);
    let mut session = session_with(config, MemorySink::new());

    session.render_block(&word, Some(10_000.0)).unwrap();

    let ctx = LayoutContext::new(&BoxTypeface, &styles, width);
    let lines = session.visible_lines();
    let word_width = 100.0 * 16.0;
    assert_eq!(lines.len(), (word_width / width).ceil() as usize);
    assert_eq!(
        lines.iter().map(|line| line.text()).collect::<String>(),
        word
    );
    for line in &lines {
        assert!(ctx.measure(line) <= width);
    }
}

#[test]
fn cancel_key_stops_the_loop_and_later_calls_return_immediately() {
    let mut config = config();
    config.reveal.chars_per_second = 10.0;
    let mut session = session_with(config, MemorySink::new().cancel_after(3));

    let summary = session
        .render_block("a long block of text that would take many ticks", None)
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.frames, 3);
    assert_eq!(session.state(), SessionState::Cancelled);

    let again = session.render_block("more text", None).unwrap();
    assert!(again.cancelled);
    assert_eq!(again.frames, 0);
    assert_eq!(session.display_idle(None).unwrap().frames, 0);
    assert_eq!(session.sink().presented(), 3);

    session.close().unwrap();
    assert_eq!(session.sink().close_calls(), 1);
}

#[test]
fn retained_window_drops_old_blocks() {
    let mut config = config();
    config.carry_over = true;
    config.retain_chars = 60;
    let mut session = session_with(config, MemorySink::new());

    for index in 0..8 {
        let text = format!("block number {index} says hi");
        session.render_block(&text, Some(10_000.0)).unwrap();
    }

    let texts = session
        .visible_lines()
        .iter()
        .map(|line| line.text())
        .collect::<Vec<_>>();
    assert!(!texts.contains(&"block number 0 says hi".to_owned()));
    assert_eq!(texts.last().map(String::as_str), Some("block number 7 says hi"));
}

#[test]
fn emphasis_is_revealed_without_delimiters() {
    let mut session = session_with(config(), MemorySink::new());
    session
        .render_block("plain **loud** and *soft*", Some(10_000.0))
        .unwrap();
    let visible = session.visible_lines();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].text(), "plain loud and soft");
}

#[test]
fn real_time_pacing_holds_across_block_and_idle_boundaries() {
    let mut config = SessionConfig::headless(320, 240);
    config.margins.top = 20;
    config.margins.bottom = 20;
    config.margins.side = 20;
    config.fonts.size = 16;
    config.fps = 20;
    let period = Duration::from_millis(50);
    let mut session = StreamSession::with_parts(config, BoxTypeface, MemorySink::new())
        .unwrap()
        .with_pacing(Pacing::RealTime);

    let start = Instant::now();
    for _ in 0..3 {
        session.render_block("hi", Some(1000.0)).unwrap();
        session.display_idle(Some(Duration::from_millis(100))).unwrap();
    }
    let elapsed = start.elapsed();

    let frames = session.frames_emitted();
    assert_eq!(frames, 9);
    let floor = period * (frames as u32 - 1);
    assert!(
        elapsed >= floor,
        "{frames} frames took {elapsed:?}, real time needs at least {floor:?}"
    );
}
