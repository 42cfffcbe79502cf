use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use imprint_core::{Actor, Decimal, InvoiceId, InvoiceItemId, RecordMeta, UserId};
use imprint_sales::{
    distribute, recalculate_items, Invoice, InvoiceItem, NewInvoice, NewInvoiceItem, Settlement,
};
use rust_decimal_macros::dec;

fn items(count: usize, actor: &Actor) -> Vec<InvoiceItem> {
    (0..count)
        .map(|i| {
            NewInvoiceItem {
                product_id: None,
                quantity: (i % 7) as i32 + 1,
                unit_price: dec!(12.35),
                discount_percent: dec!(2.5),
                total_price: None,
                paid_amount: if i % 3 == 0 { dec!(5.00) } else { Decimal::ZERO },
            }
            .into_item(InvoiceItemId::new(i as i64 + 1), InvoiceId::new(1), actor)
        })
        .collect()
}

fn invoice(actor: &Actor) -> Invoice {
    let new = NewInvoice {
        discount_percent: dec!(10),
        tax_percent: dec!(15),
        ..NewInvoice::default()
    };
    Invoice::from_new(InvoiceId::new(1), new, RecordMeta::created(actor))
}

fn bench_settlement_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement_compute");
    let actor = Actor::now(UserId::new(1));
    let header = invoice(&actor);

    for size in [1usize, 10, 100, 1000].iter() {
        let lines = items(*size, &actor);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("items", size), &lines, |b, lines| {
            b.iter(|| black_box(Settlement::compute(&header, black_box(lines))));
        });
    }

    group.finish();
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    let actor = Actor::now(UserId::new(1));

    group.bench_function("fifo_distribute_100", |b| {
        let base = items(100, &actor);
        b.iter(|| {
            let mut lines = base.clone();
            black_box(distribute(&mut lines, black_box(dec!(2500.00)), &actor));
        });
    });

    group.bench_function("recalculate_100", |b| {
        let base = items(100, &actor);
        b.iter(|| {
            let mut lines = base.clone();
            black_box(recalculate_items(&mut lines, &actor));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_settlement_compute, bench_allocation);
criterion_main!(benches);
