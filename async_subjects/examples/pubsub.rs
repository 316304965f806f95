// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A basic publish/subscribe demo. Two consumer tasks subscribe to one
//! subject; two producers push elements (one suspending, one without a
//! suspension point) before the subject is terminated cleanly.
//!
//! Execute with
//!
//! ```text
//! cargo run --example pubsub
//! ```

extern crate async_subjects;

use std::time::Duration;

use async_subjects::subject::PassthroughSubject;
use async_subjects::subject::SubjectReceiverExt;
use async_subjects::subject::Termination;

fn init_logging() {
    let dir = tracing_subscriber::filter::Directive::from(tracing::Level::DEBUG);

    use std::io::stderr;
    use std::io::IsTerminal;
    use tracing_glog::Glog;
    use tracing_glog::GlogFields;
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    let fmt = tracing_subscriber::fmt::Layer::default()
        .with_ansi(stderr().is_terminal())
        .with_writer(std::io::stderr)
        .event_format(Glog::default().with_timer(tracing_glog::LocalTime::default()))
        .fmt_fields(GlogFields::default().compact());

    let filter = vec![dir]
        .into_iter()
        .fold(EnvFilter::from_default_env(), |filter, directive| {
            filter.add_directive(directive)
        });

    let subscriber = Registry::default().with(filter).with(fmt);
    tracing::subscriber::set_global_default(subscriber).expect("to set global subscriber");
}

#[tokio::main]
async fn main() {
    init_logging();

    let subject = PassthroughSubject::<String, String>::new();

    let mut first = subject.subscribe().await;
    let consumer_a = tokio::spawn(async move {
        first
            .for_each(|element| tracing::info!("Consumer A got: {element}"))
            .await
    });

    let mut second = subject.subscribe().await;
    let consumer_b = tokio::spawn(async move {
        while let Some(element) = second.recv().await? {
            tracing::info!("Consumer B got: {element}");
        }
        Ok::<_, String>(())
    });

    for index in 0..5u32 {
        subject.send(format!("Message {index}")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // the non-suspending variants are serialized with each other, so the
    // termination is applied after the final element
    subject.send_nonblocking("One more, without suspending".to_string());
    subject.terminate_nonblocking(Termination::Finished);

    consumer_a
        .await
        .expect("Consumer A panicked")
        .expect("Subject failed");
    consumer_b
        .await
        .expect("Consumer B panicked")
        .expect("Subject failed");
    tracing::info!("fin.");
}
