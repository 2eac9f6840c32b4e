//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for mailbox and routing operations

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use linerelay_service::{ClientIdentity, DrainOrder, Mailbox, RoutingPolicy};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn identity(name: &str) -> ClientIdentity {
    name.parse().unwrap()
}

fn bench_append_take(c: &mut Criterion) {
    let mut group = c.benchmark_group("mailbox_append_take");

    for size in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(size as u64));
        for order in [DrainOrder::Lifo, DrainOrder::Fifo] {
            group.bench_with_input(BenchmarkId::new(order.to_string(), size), &size, |b, &size| {
                let mailbox = Mailbox::new(identity("alice"), order, None);
                b.iter(|| {
                    for n in 0..size {
                        mailbox.append(format!("line {}", n)).unwrap();
                    }
                    while let Some(payload) = mailbox.take_one() {
                        black_box(payload);
                    }
                })
            });
        }
    }

    group.finish();
}

fn bench_contended_append(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("mailbox_contended");
    group.throughput(Throughput::Elements(8 * 128));

    group.bench_function("8_producers_1_consumer", |b| {
        b.to_async(&rt).iter(|| async {
            let mailbox = Arc::new(Mailbox::new(identity("alice"), DrainOrder::Lifo, None));
            let producers: Vec<_> = (0..8)
                .map(|p| {
                    let mailbox = mailbox.clone();
                    tokio::spawn(async move {
                        for n in 0..128 {
                            mailbox.append(format!("{}:{}", p, n)).unwrap();
                        }
                    })
                })
                .collect();

            let mut received = 0;
            while received < 8 * 128 {
                match mailbox.take_one() {
                    Some(payload) => {
                        black_box(payload);
                        received += 1;
                    }
                    None => mailbox.notified().await,
                }
            }

            for producer in producers {
                producer.await.unwrap();
            }
        })
    });

    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let sender = identity("alice");

    group.bench_function("echo", |b| {
        b.iter(|| black_box(RoutingPolicy::Echo.route(&sender, black_box("hello world"))))
    });

    group.bench_function("directed", |b| {
        b.iter(|| {
            black_box(RoutingPolicy::Directed.route(&sender, black_box("@bob hello world")))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_append_take, bench_contended_append, bench_routing);
criterion_main!(benches);
