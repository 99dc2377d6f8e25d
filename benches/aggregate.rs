use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use drsreport::aggregate::group_report;
use drsreport::parser::report::parse_report;

fn synthetic_report(objects: usize, files_per_object: usize) -> String {
    let mut text = String::from("OBJ-ID\tOBJ-URN\tOBJ-OSN\tFILE-ORIGPATH\tFILE-FORMAT\tFILE-URN\n");
    for obj in 0..objects {
        for file in 0..files_per_object {
            let (path, format) = if file % 3 == 0 {
                (format!("disk{obj}/scan_{file}.tif"), "TIFF")
            } else {
                (format!("disk{obj}/track_{file}.mp3"), "MP3")
            };
            text.push_str(&format!(
                "{obj}\tURN-3:HUL.OIS:{obj}\t{file}\t{path}\t{format}\tURN-3:FHCL:{obj}-{file}\n"
            ));
        }
    }
    text
}

fn bench_parse_report(c: &mut Criterion) {
    let text = synthetic_report(200, 20);

    c.bench_function("parse_report_4000_rows", |b| {
        b.iter(|| parse_report(&text).unwrap().rows.len())
    });
}

fn bench_group_report(c: &mut Criterion) {
    let table = parse_report(&synthetic_report(200, 20)).unwrap();

    c.bench_function("group_report_4000_rows", |b| {
        b.iter(|| group_report(&table, Path::new("bench.txt")).unwrap().len())
    });
}

criterion_group!(benches, bench_parse_report, bench_group_report);
criterion_main!(benches);
