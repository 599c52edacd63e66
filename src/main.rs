//! attn-deconv 命令行：训练、验证与反卷积可视化

use anyhow::{Context, Result, bail};
use attn_deconv::data::{ImageFolderDataset, load_image, one_hot};
use attn_deconv::nn::{Adam, AttentionDeconvNet, Device, ModelConfig, TrainScope};
use attn_deconv::train::{SIMULATION_STEPS, TrainConfig, Trainer, Validator, write_simulation_csv};
use attn_deconv::vision::Vision;
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "attn-deconv")]
#[command(version)]
#[command(about = "带注意力门的卷积分类网络：训练、验证与反卷积可视化")]
struct Cli {
    /// 日志详细程度（-v, -vv, -vvv）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 带注意力信号训练
    Train {
        /// 模型配置（.json，新建模型）或已保存的模型检查点
        model: PathBuf,

        /// 设备编号，负数为 CPU
        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        gpu: i64,

        #[arg(short, long, default_value_t = 1)]
        batch_size: usize,

        #[arg(short, long, default_value_t = 30)]
        epochs: usize,

        /// 每隔多少个 epoch 保存一次检查点
        #[arg(short, long, default_value_t = 10)]
        save_interval: usize,

        /// 数据集根目录（含 train/ 与 test/）
        #[arg(long, value_name = "DIR")]
        data: PathBuf,

        /// 输出目录
        #[arg(long, default_value = "result", value_name = "DIR")]
        out: PathBuf,

        #[arg(long, default_value_t = 0.001)]
        lr: f32,

        #[arg(long, default_value_t = 0.0005)]
        weight_decay: f32,

        /// 训练全部参数（默认只训练注意力投影）
        #[arg(long)]
        train_all: bool,

        /// 续训时加载的优化器状态
        #[arg(long, value_name = "FILE")]
        optimizer: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// 验证已训练的模型
    Validate {
        checkpoint: PathBuf,

        #[arg(long, value_name = "DIR")]
        data: PathBuf,

        #[arg(long, value_enum, default_value_t = ValidateMode::All)]
        mode: ValidateMode,

        #[arg(long)]
        use_train_data: bool,

        #[arg(long)]
        no_attention: bool,

        /// sample / simulate 模式使用的图像
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,

        /// sample 模式下的注意力类别
        #[arg(long)]
        attention: Option<usize>,

        #[arg(long, default_value_t = SIMULATION_STEPS)]
        steps: usize,

        /// simulate 模式的结果 CSV
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        gpu: i64,
    },
    /// 反卷积重建并导出图像
    Visualize {
        checkpoint: PathBuf,

        #[arg(long, value_name = "FILE")]
        image: PathBuf,

        /// 对第 N 个 block 的每个特征图分别重建
        #[arg(long, conflicts_with = "attention", required_unless_present = "attention")]
        layer: Option<usize>,

        /// 以类别 N 为注意力信号，从注意力阶段重建
        #[arg(long)]
        attention: Option<usize>,

        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        gpu: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ValidateMode {
    /// 随机抽样交互检查
    Random,
    /// 整体准确率
    All,
    /// 单张图像预测
    Sample,
    /// 注意力自反馈模拟
    Simulate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Train {
            model,
            gpu,
            batch_size,
            epochs,
            save_interval,
            data,
            out,
            lr,
            weight_decay,
            train_all,
            optimizer,
            seed,
        } => {
            let config = TrainConfig {
                batch_size,
                epochs,
                save_interval,
                learning_rate: lr,
                weight_decay,
                scope: if train_all { TrainScope::Full } else { TrainScope::Attention },
                seed,
                out_dir: out,
            };
            handle_train(&model, Device::from_index(gpu), &data, config, optimizer.as_deref())
        }
        Commands::Validate {
            checkpoint,
            data,
            mode,
            use_train_data,
            no_attention,
            image,
            attention,
            steps,
            out,
            gpu,
        } => {
            let model = AttentionDeconvNet::load(&checkpoint, Device::from_index(gpu))
                .with_context(|| format!("无法加载模型 {}", checkpoint.display()))?;
            let dataset = ImageFolderDataset::open(&data, model.config().input_size)
                .with_context(|| format!("无法打开数据集 {}", data.display()))?;
            let validator = Validator::new(model, dataset);
            handle_validate(
                &validator,
                mode,
                !use_train_data,
                !no_attention,
                image.as_deref(),
                attention,
                steps,
                out.as_deref(),
            )
        }
        Commands::Visualize {
            checkpoint,
            image,
            layer,
            attention,
            out,
            gpu,
        } => handle_visualize(&checkpoint, Device::from_index(gpu), &image, layer, attention, &out),
    }
}

fn handle_train(
    model_path: &Path,
    device: Device,
    data: &Path,
    config: TrainConfig,
    optimizer: Option<&Path>,
) -> Result<()> {
    let mut model = if model_path.extension().is_some_and(|e| e == "json") {
        let model_config = ModelConfig::from_json_file(model_path)
            .with_context(|| format!("无法读取模型配置 {}", model_path.display()))?;
        AttentionDeconvNet::new(model_config, device)?
    } else {
        AttentionDeconvNet::load(model_path, device)
            .with_context(|| format!("无法加载模型 {}", model_path.display()))?
    };
    let dataset = ImageFolderDataset::open(data, model.config().input_size)
        .with_context(|| format!("无法打开数据集 {}", data.display()))?;

    let mut trainer = match optimizer {
        Some(path) => {
            let state = Adam::load(path).with_context(|| format!("无法加载优化器状态 {}", path.display()))?;
            Trainer::with_optimizer(config, state)
        }
        None => Trainer::new(config),
    };
    let interrupted = trainer.interrupt_handle();
    ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst)).context("无法注册 Ctrl-C 处理函数")?;
    let history = trainer.fit(&mut model, &dataset)?;
    if let Some(last) = history.last() {
        println!(
            "训练完成：epoch {}，train loss {}，test loss {}",
            last.epoch, last.train_loss, last.test_loss
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_validate(
    validator: &Validator<ImageFolderDataset>,
    mode: ValidateMode,
    test: bool,
    attention: bool,
    image: Option<&Path>,
    attention_label: Option<usize>,
    steps: usize,
    out: Option<&Path>,
) -> Result<()> {
    let size = validator.model().config().input_size;
    let load_sample = || -> Result<_> {
        let Some(path) = image else {
            bail!("该模式需要 --image");
        };
        load_image(path, size).with_context(|| format!("无法读取图像 {}", path.display()))
    };

    match mode {
        ValidateMode::Random => {
            let stdin = io::stdin();
            let rounds = validator.inspect_random(test, attention, &mut rand::thread_rng(), stdin.lock(), io::stdout())?;
            println!("共检查{rounds}个样本");
        }
        ValidateMode::All => {
            let accuracy = validator.validate_all(test, attention)?;
            println!("{accuracy}");
        }
        ValidateMode::Sample => {
            let x = load_sample()?;
            let pred = validator.predict_sample(&x, attention_label)?;
            println!("prediction: {pred:?}");
        }
        ValidateMode::Simulate => {
            let x = load_sample()?;
            let result = validator.simulate(&x, steps, &mut rand::thread_rng())?;
            match out {
                Some(path) => write_simulation_csv(path, &result)?,
                None => println!("{result:?}"),
            }
        }
    }
    Ok(())
}

fn handle_visualize(
    checkpoint: &Path,
    device: Device,
    image: &Path,
    layer: Option<usize>,
    attention: Option<usize>,
    out: &Path,
) -> Result<()> {
    let mut model = AttentionDeconvNet::load(checkpoint, device)
        .with_context(|| format!("无法加载模型 {}", checkpoint.display()))?;
    let x = load_image(image, model.config().input_size)
        .with_context(|| format!("无法读取图像 {}", image.display()))?;

    let (stack, prefix) = match (layer, attention) {
        (Some(n), _) => (model.reconstruct_per_feature_map(&x, n)?, format!("block{n}")),
        (None, Some(label)) => {
            let aux = one_hot(&[label], model.config().aux_dim)?;
            (model.reconstruct_from_attention(&x, &aux)?, format!("attention{label}"))
        }
        (None, None) => bail!("需要 --layer 或 --attention"),
    };
    let written = Vision::save_reconstructions(&stack, out, &prefix)?;
    println!("已写出{}个文件到 {}", written.len(), out.display());
    Ok(())
}
