//! 并行特征提取流水线
//!
//! 每一行 CSV 是一个任务，由独立的 rayon 线程池执行「读取图片 → 检测特征点」，
//! 完成的结果通过 channel 交给唯一的聚合线程，按对象键汇总成数据库。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use indicatif::ProgressBar;
use log::{debug, info};
use opencv::prelude::*;
use rayon::prelude::*;

use crate::config::CollisionPolicy;
use crate::database::{Database, ObjectRecord};
use crate::detector::{Detector, DetectorFactory, Features};
use crate::error::{Error, Result};
use crate::image;
use crate::matrix::{DescriptorMatrix, Matrix};
use crate::source::{ObjectKey, SourceIndex, SourceRow};

/// 读取 `base_dir/path` 并检测特征点
pub fn process<D: Detector + ?Sized>(
    detector: &mut D,
    base_dir: &Path,
    path: &Path,
) -> Result<Features> {
    let path = base_dir.join(path);
    let image = image::imread(&path)?;
    let features = detector
        .detect(&image)
        .map_err(|e| Error::Detection { path: path.clone(), source: Box::new(e) })?;
    debug!(
        "{}: {}x{}, {} 个特征点",
        path.display(),
        image.cols(),
        image.rows(),
        features.len()
    );
    Ok(features)
}

/// 单个任务的结果
struct Completed {
    line: usize,
    key: ObjectKey,
    features: Features,
}

pub struct Coordinator<F> {
    factory: F,
    base_dir: PathBuf,
    concurrency: usize,
    collision: CollisionPolicy,
    progress: ProgressBar,
}

impl<F: DetectorFactory> Coordinator<F> {
    pub fn new(factory: F, base_dir: impl AsRef<Path>) -> Self {
        Self {
            factory,
            base_dir: base_dir.as_ref().to_path_buf(),
            concurrency: num_cpus::get(),
            collision: CollisionPolicy::default(),
            progress: ProgressBar::hidden(),
        }
    }

    /// 工作线程数量，至少为 1
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.collision = policy;
        self
    }

    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.progress = pb;
        self
    }

    /// 处理所有行并汇总结果，任意一个任务失败都会使整个流程失败
    pub fn run(&self, index: &SourceIndex) -> Result<Database> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("briskdb-worker-{}", i))
            .build()?;
        info!("开始处理 {} 张图片，线程数 {}", index.len(), self.concurrency);
        self.progress.set_length(index.len() as u64);

        let aggregator = Aggregator::new(self.collision, index);
        let (tx, rx) = bounded::<Completed>(self.concurrency * 2);

        let (result, aggregated) = thread::scope(|s| {
            let handle = s.spawn(move || aggregator.consume(rx));

            // 每个 rayon 任务分片持有自己的检测器和发送端，检测器在第一次使用时创建
            let result = pool.install(|| {
                index.rows().par_iter().try_for_each_init(
                    || (tx.clone(), None::<F::Detector>),
                    |state, row| self.run_task(&state.0, &mut state.1, row),
                )
            });
            // 所有发送端释放后聚合线程才会退出
            drop(tx);

            match handle.join() {
                Ok(aggregated) => (result, aggregated),
                Err(e) => std::panic::resume_unwind(e),
            }
        });
        let database = match result.and(aggregated) {
            Ok(database) => database,
            Err(e) => {
                self.progress.abandon();
                return Err(e);
            }
        };
        self.progress.finish_with_message("特征提取完成");
        info!("共 {} 个对象", database.len());
        Ok(database)
    }

    fn run_task(
        &self,
        tx: &Sender<Completed>,
        detector: &mut Option<F::Detector>,
        row: &SourceRow,
    ) -> Result<()> {
        let detector = match detector {
            Some(detector) => detector,
            None => detector.insert(
                self.factory.create().map_err(|e| Error::DetectorInit(Box::new(e)))?,
            ),
        };
        let features = process(detector, &self.base_dir, &row.path)?;
        self.progress.set_message(row.path.display().to_string());
        self.progress.inc(1);
        tx.send(Completed { line: row.line, key: row.key.clone(), features })
            .map_err(|_| Error::Aggregation)
    }
}

/// 同一对象键在不同行的结果，按行号排序
#[derive(Default)]
struct Slot {
    first_line: usize,
    parts: BTreeMap<usize, Features>,
}

/// 结果表的唯一写入者
struct Aggregator {
    policy: CollisionPolicy,
    slots: HashMap<ObjectKey, Slot>,
}

impl Aggregator {
    fn new(policy: CollisionPolicy, index: &SourceIndex) -> Self {
        let mut slots = HashMap::new();
        for row in index.rows() {
            slots
                .entry(row.key.clone())
                .or_insert_with(|| Slot { first_line: row.line, parts: BTreeMap::new() });
        }
        Self { policy, slots }
    }

    fn insert(&mut self, done: Completed) {
        let slot = self.slots.entry(done.key).or_insert_with(|| Slot {
            first_line: done.line,
            parts: BTreeMap::new(),
        });
        match self.policy {
            // 只保留行号最大的结果，与完成顺序无关
            CollisionPolicy::Last => {
                if slot.parts.keys().next_back().is_none_or(|&line| line < done.line) {
                    slot.parts.clear();
                    slot.parts.insert(done.line, done.features);
                }
            }
            CollisionPolicy::Merge => {
                slot.parts.insert(done.line, done.features);
            }
        }
    }

    fn consume(mut self, rx: Receiver<Completed>) -> Result<Database> {
        for done in rx {
            self.insert(done);
        }
        self.finish()
    }

    /// 按对象键首次出现的顺序生成数据库
    fn finish(self) -> Result<Database> {
        let mut slots =
            self.slots.into_iter().filter(|(_, s)| !s.parts.is_empty()).collect::<Vec<_>>();
        slots.sort_by_key(|(_, s)| s.first_line);

        let mut database = Database::new();
        for (key, slot) in slots {
            let title = key.title();
            let features = merge(&title, slot.parts.into_values())?;
            database.insert(key, ObjectRecord::new(title, features));
        }
        Ok(database)
    }
}

/// 按顺序拼接特征点与描述符，跳过没有特征点的部分
fn merge(title: &str, parts: impl IntoIterator<Item = Features>) -> Result<Features> {
    let mut parts = parts.into_iter().filter(|f| !f.is_empty()).peekable();
    let Some(first) = parts.next() else {
        return Ok(Features::default());
    };
    if parts.peek().is_none() {
        return Ok(first);
    }

    let (mut keypoints, first_des) = first.into_parts();
    let mut descriptors = DescriptorMatrix::new(first_des.width());
    descriptors.append(&first_des);
    for part in parts {
        if part.descriptors().width() != descriptors.width() {
            return Err(Error::WidthMismatch {
                title: title.to_owned(),
                expected: descriptors.width(),
                found: part.descriptors().width(),
            });
        }
        keypoints.extend_from_slice(part.keypoints());
        descriptors.append(part.descriptors());
    }
    Features::new(keypoints, descriptors)
}

#[cfg(test)]
mod tests {
    use crate::detector::Keypoint;

    use super::*;

    fn features(n: usize, width: usize, fill: u8) -> Features {
        let mut des = DescriptorMatrix::new(width);
        let kps = (0..n)
            .map(|i| {
                des.push(&vec![fill; width]);
                Keypoint { x: fill as f32, y: i as f32 }
            })
            .collect();
        Features::new(kps, des).unwrap()
    }

    fn done(line: usize, key: &str, f: Features) -> Completed {
        Completed { line, key: ObjectKey::new([key]), features: f }
    }

    fn index(csv: &str) -> SourceIndex {
        SourceIndex::parse(csv.as_bytes()).unwrap()
    }

    #[test]
    fn last_policy_ignores_completion_order() {
        let idx = index("1.png,w\n2.png,w\n3.png,g\n");
        let mut agg = Aggregator::new(CollisionPolicy::Last, &idx);
        agg.insert(done(2, "w", features(3, 16, 2)));
        agg.insert(done(3, "g", features(1, 16, 3)));
        agg.insert(done(1, "w", features(2, 16, 1)));
        let db = agg.finish().unwrap();

        assert_eq!(db.len(), 2);
        let w = db.get(&ObjectKey::new(["w"])).unwrap();
        assert_eq!(w.title, "w");
        assert_eq!(w.keypoints().len(), 3);
        assert_eq!(w.descriptors().line(0), &[2; 16]);
    }

    #[test]
    fn merge_policy_concatenates_in_row_order() {
        let idx = index("1.png,w\n2.png,w\n3.png,w\n");
        let mut agg = Aggregator::new(CollisionPolicy::Merge, &idx);
        agg.insert(done(3, "w", features(1, 4, 3)));
        agg.insert(done(1, "w", features(2, 4, 1)));
        agg.insert(done(2, "w", features(0, 0, 0)));
        let db = agg.finish().unwrap();

        let w = &db.records()[0];
        assert_eq!(w.keypoints().len(), 3);
        assert_eq!(w.descriptors().height(), 3);
        let xs = w.keypoints().iter().map(|k| k.x).collect::<Vec<_>>();
        assert_eq!(xs, vec![1., 1., 3.]);
        assert_eq!(w.descriptors().as_bytes(), &[1, 1, 1, 1, 1, 1, 1, 1, 3, 3, 3, 3]);
    }

    #[test]
    fn merge_rejects_mixed_widths() {
        let err = merge("w", [features(1, 4, 0), features(1, 8, 0)]).unwrap_err();
        assert!(matches!(err, Error::WidthMismatch { expected: 4, found: 8, .. }));
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        let f = merge("w", [features(0, 0, 0), features(0, 0, 0)]).unwrap();
        assert!(f.is_empty());
        assert_eq!(f.descriptors().width(), 0);
    }

    #[test]
    fn entries_follow_first_appearance() {
        let idx = index("a.png,z\nb.png,a\nc.png,z\nd.png,m\n");
        let mut agg = Aggregator::new(CollisionPolicy::Last, &idx);
        for (line, key) in [(4, "m"), (3, "z"), (2, "a"), (1, "z")] {
            agg.insert(done(line, key, features(1, 1, line as u8)));
        }
        let db = agg.finish().unwrap();

        let titles = db.records().iter().map(|r| r.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["z", "a", "m"]);
    }

    #[test]
    fn multi_field_title() {
        let idx = index("a.png,book,2nd\n");
        let mut agg = Aggregator::new(CollisionPolicy::Last, &idx);
        agg.insert(Completed {
            line: 1,
            key: ObjectKey::new(["book", "2nd"]),
            features: features(1, 2, 0),
        });
        assert_eq!(agg.finish().unwrap().records()[0].title, "book:2nd");
    }
}
