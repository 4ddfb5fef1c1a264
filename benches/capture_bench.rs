use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chatshot::rendering::BitmapRasterizer;
use chatshot::select::select_window;
use chatshot::snapshot::snapshot;
use chatshot::stage::{OffscreenHost, Stage, StageOptions};
use chatshot::{Conversation, RasterOptions, RenderMode, WindowSpec};

fn chat(n: usize) -> String {
    let mut html = String::from("<div id=\"chat\" style=\"width: 640px\">");
    for i in 0..n {
        html.push_str(&format!(
            "<div class=\"mes\" mesid=\"{i}\"><div class=\"mes_block\">\
             <div class=\"ch_name\"><span class=\"name_text\">Bot</span></div>\
             <div class=\"mes_text\"><p>Message number {i} with a few more words so that it wraps \
             across at least two lines of the stage.</p></div></div></div>"
        ));
    }
    html.push_str("</div>");
    html
}

fn bench_select_window(c: &mut Criterion) {
    let all: Vec<usize> = (0..1000).collect();
    let spec: WindowSpec = "prev4".parse().unwrap();
    c.bench_function("select_window_prev4", |b| {
        b.iter(|| select_window(black_box(&all), black_box(&500), spec).unwrap())
    });
}

fn bench_render(c: &mut Criterion) {
    let conv = Conversation::parse(&chat(20)).unwrap();
    let copies = snapshot(&conv, &conv.messages(), true).unwrap();
    let host = OffscreenHost::new();
    let stage = Stage::mount(
        &host,
        copies,
        StageOptions {
            sizing_hint: conv.panel_width(),
            background_hint: None,
        },
    );
    let rasterizer = BitmapRasterizer::new();

    for (name, mode) in [("render_direct_20", RenderMode::Direct), ("render_markup_20", RenderMode::Markup)] {
        let options = RasterOptions::new(1.0, mode).unwrap();
        c.bench_function(name, |b| b.iter(|| rasterizer.render(stage.container(), &options).unwrap()));
    }
}

fn bench_snapshot(c: &mut Criterion) {
    let conv = Conversation::parse(&chat(50)).unwrap();
    let all = conv.messages();
    c.bench_function("snapshot_50", |b| b.iter(|| snapshot(&conv, black_box(&all), false).unwrap()));
}

criterion_group!(benches, bench_select_window, bench_render, bench_snapshot);
criterion_main!(benches);
