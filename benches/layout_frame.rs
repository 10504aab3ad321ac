//! Per-tick cost: incremental layout plus rasterizing one 720p frame.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use typewire::fonts::{BoxTypeface, StyleTable};
use typewire::layout::{layout_text, LayoutContext, TextLayout};
use typewire::markup::preprocess;
use typewire::render::FrameRenderer;
use typewire::reveal::BlockCursor;
use typewire::SessionConfig;

const ARTICLE: &str = "# Dublin\n\
Dublin is the capital of Ireland. It sits on the east coast at the mouth of the **River Liffey**.\n\
\n\
## History\n\
The area was settled by the *Vikings* in the ninth century and grew into a major medieval town.";

fn bench_layout(c: &mut Criterion) {
    let config = SessionConfig::headless(1280, 720);
    let styles = StyleTable::from_config(&config.fonts);
    let ctx = LayoutContext::new(&BoxTypeface, &styles, config.text_width());
    let text = ARTICLE.repeat(20);

    let mut group = c.benchmark_group("layout");
    group.bench_function("full_relayout_20_articles", |b| {
        b.iter(|| black_box(layout_text(black_box(&text), &ctx)))
    });
    group.bench_function("incremental_tick_20_articles", |b| {
        let mut cursor = BlockCursor::new(preprocess(&text));
        let total = cursor.total_chars();
        let mut layout = TextLayout::new(config.retain_chars);
        let mut revealed = 0;
        b.iter(|| {
            revealed = if revealed >= total { 1 } else { revealed + 5 };
            if revealed == 1 {
                layout.clear();
                cursor = BlockCursor::new(preprocess(&text));
            }
            cursor.sync(revealed.min(total), &mut layout, &ctx);
            black_box(layout.line_count())
        })
    });
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let config = SessionConfig::headless(1280, 720);
    let styles = StyleTable::from_config(&config.fonts);
    let ctx = LayoutContext::new(&BoxTypeface, &styles, config.text_width());
    let lines = layout_text(ARTICLE, &ctx);
    let mut renderer = FrameRenderer::new(&config);
    let mut frame = renderer.blank_frame();

    let mut group = c.benchmark_group("render_frame");
    group.sample_size(50);
    group.bench_function("box_typeface_720p", |b| {
        b.iter(|| black_box(renderer.render(&mut frame, &BoxTypeface, &styles, &lines, 0.0)))
    });
    group.finish();
}

criterion_group!(benches, bench_layout, bench_render);
criterion_main!(benches);
