use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use scheduler_config::{AppConfig, LogFormat};
use scheduler_core::{BatchSizingConfig, DispatchMode, GateCondition, Job};
use scheduler_infrastructure::init_logging;

use flow_scheduler::app::ControlPlane;
use flow_scheduler::operator::{parse_json_object, StatusReport};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliApp::parse();
    cli.run().await
}

/// CLI应用程序主结构
#[derive(clap::Parser, Debug)]
#[command(name = "flow-scheduler-cli")]
#[command(version = "1.0.0")]
#[command(about = "工作流任务调度 - 命令行管理工具")]
#[command(long_about = "直接操作共享存储中的任务队列、阶段游标、批大小配置和阶段闸门")]
struct CliApp {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径，缺省时按默认位置查找
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 任务队列
    Queue(QueueCommands),
    /// 阶段游标
    Cursor(CursorCommands),
    /// 自适应批大小
    Batch(BatchCommands),
    /// 阶段闸门
    Gate(GateCommands),
    /// 显示队列与控制面状态
    Status,
}

#[derive(Args, Debug)]
struct QueueCommands {
    #[command(subcommand)]
    action: QueueActions,
}

#[derive(Subcommand, Debug)]
enum QueueActions {
    /// 添加任务
    Add {
        /// 工作流ID或定义文件路径
        workflow: String,
        /// 派发方式 (id / file)
        #[arg(short, long, default_value = "id")]
        mode: String,
        /// 工作流输入 (JSON对象)
        #[arg(short, long)]
        data: Option<String>,
        /// 任务元数据 (JSON对象)，可包含 phase / run_id / batch_size
        #[arg(long)]
        meta: Option<String>,
        /// 延迟执行（毫秒）
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },
    /// 列出待执行任务
    List {
        /// 显示数量
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// 以JSON输出
        #[arg(long)]
        json: bool,
    },
    /// 清空队列
    Clear,
}

#[derive(Args, Debug)]
struct CursorCommands {
    #[command(subcommand)]
    action: CursorActions,
}

#[derive(Subcommand, Debug)]
enum CursorActions {
    /// 删除某个运行的全部游标
    Reset { run_id: String },
    /// 设置游标字段，例如 `1_current 5`
    Set {
        run_id: String,
        field: String,
        value: i64,
    },
    /// 查看游标
    Get {
        run_id: String,
        field: Option<String>,
    },
}

#[derive(Args, Debug)]
struct BatchCommands {
    #[command(subcommand)]
    action: BatchActions,
}

#[derive(Subcommand, Debug)]
enum BatchActions {
    /// 显示当前批大小与全部配置
    Show,
    /// 读取单个配置字段
    Get { field: String },
    /// 修改单个配置字段
    Set { field: String, value: String },
    /// 恢复默认配置
    Reset,
}

#[derive(Args, Debug)]
struct GateCommands {
    #[command(subcommand)]
    action: GateActions,
}

#[derive(Subcommand, Debug)]
enum GateActions {
    /// 设置阶段依赖
    Set {
        phase: String,
        dependency: String,
        #[arg(long, default_value = "complete")]
        condition: String,
    },
    /// 查看阶段规则
    Get { phase: String },
    /// 列出全部规则
    List,
    /// 删除阶段规则
    Remove { phase: String },
}

impl CliApp {
    fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    async fn run(self) -> Result<()> {
        let config = AppConfig::load(self.config.as_deref()).context("加载配置失败")?;
        init_logging("warn", LogFormat::Pretty)?;

        let control = ControlPlane::connect(&config).await?;

        match self.command {
            Commands::Queue(cmd) => handle_queue_commands(cmd, &control).await,
            Commands::Cursor(cmd) => handle_cursor_commands(cmd, &control).await,
            Commands::Batch(cmd) => handle_batch_commands(cmd, &control).await,
            Commands::Gate(cmd) => handle_gate_commands(cmd, &control).await,
            Commands::Status => {
                let report = StatusReport::collect(&control).await?;
                println!("{report}");
                Ok(())
            }
        }
    }
}

async fn handle_queue_commands(cmd: QueueCommands, control: &ControlPlane) -> Result<()> {
    match cmd.action {
        QueueActions::Add {
            workflow,
            mode,
            data,
            meta,
            delay_ms,
        } => {
            let mode: DispatchMode = mode.parse()?;
            let inputs = parse_json_object("--data", data.as_deref())?;
            let meta = parse_json_object("--meta", meta.as_deref())?;

            let ack = control
                .queue
                .enqueue(&workflow, inputs.into(), mode, meta, delay_ms)
                .await?;
            println!("任务已入队: {}", ack.job_id);
            println!("  子队列: {} (长度 {})", ack.target, ack.depth);
            if let Some(ready_at) = ack.ready_at {
                println!("  就绪时间: {}", format_millis(ready_at));
            }
        }
        QueueActions::List { limit, json } => {
            let ready = control.queue.list_jobs(limit).await?;
            let delayed = control.queue.list_delayed(limit).await?;

            if json {
                let doc = serde_json::json!({ "ready": ready, "delayed": delayed });
                println!("{}", serde_json::to_string_pretty(&doc)?);
                return Ok(());
            }

            println!("就绪队列 ({} / {})", ready.len(), control.queue.size().await?);
            print_jobs_table(ready.iter().map(|job| (job, None)));
            println!();
            println!(
                "延迟队列 ({} / {})",
                delayed.len(),
                control.queue.delayed_size().await?
            );
            print_jobs_table(delayed.iter().map(|d| (&d.job, Some(d.ready_at))));
        }
        QueueActions::Clear => {
            let (ready, delayed) = control.queue.clear().await?;
            println!("已清空队列: {ready} 个就绪任务, {delayed} 个延迟任务");
        }
    }

    Ok(())
}

async fn handle_cursor_commands(cmd: CursorCommands, control: &ControlPlane) -> Result<()> {
    match cmd.action {
        CursorActions::Reset { run_id } => {
            let existed = control.queue.reset_cursors(&run_id).await?;
            control.cursor_file.reset(&run_id).await?;
            if existed {
                println!("已重置运行 {run_id} 的游标");
            } else {
                println!("运行 {run_id} 没有游标");
            }
        }
        CursorActions::Set {
            run_id,
            field,
            value,
        } => {
            control.queue.set_cursor(&run_id, &field, value).await?;
            control.cursor_file.record(&run_id, &field, value).await?;
            println!("{run_id}.{field} = {value}");
        }
        CursorActions::Get { run_id, field } => match field {
            Some(field) => match control.queue.get_cursor(&run_id, &field).await? {
                Some(value) => println!("{value}"),
                None => println!("N/A"),
            },
            None => {
                let cursors = control.queue.get_all_cursors(&run_id).await?;
                if cursors.is_empty() {
                    println!("运行 {run_id} 没有游标");
                }
                for (field, value) in cursors {
                    println!("{field:<20} {value}");
                }
            }
        },
    }

    Ok(())
}

async fn handle_batch_commands(cmd: BatchCommands, control: &ControlPlane) -> Result<()> {
    match cmd.action {
        BatchActions::Show => {
            println!("当前批大小: {}", control.sizer.get_batch_size().await?);
            print_batch_config(&control.sizer.get_config().await?)?;
        }
        BatchActions::Get { field } => {
            let config = control.sizer.get_config().await?;
            println!("{}", config.get_field(&field)?);
        }
        BatchActions::Set { field, value } => {
            let config = control.sizer.set_config_field(&field, &value).await?;
            println!("已更新 {field} = {}", config.get_field(&field)?);
        }
        BatchActions::Reset => {
            let config = control.sizer.reset_config().await?;
            println!("批大小配置已恢复默认值");
            print_batch_config(&config)?;
        }
    }

    Ok(())
}

async fn handle_gate_commands(cmd: GateCommands, control: &ControlPlane) -> Result<()> {
    match cmd.action {
        GateActions::Set {
            phase,
            dependency,
            condition,
        } => {
            let rule = control.gate.set_rule(&phase, &dependency, &condition).await?;
            println!(
                "阶段 {phase} 依赖阶段 {} ({})",
                rule.dependency, rule.condition
            );
        }
        GateActions::Get { phase } => match control.gate.get_rule(&phase).await? {
            Some(rule) => println!(
                "阶段 {phase} 依赖阶段 {} ({})",
                rule.dependency, rule.condition
            ),
            None => println!("阶段 {phase} 没有闸门规则"),
        },
        GateActions::List => {
            let rules = control.gate.list_rules().await?;
            if rules.is_empty() {
                println!("没有闸门规则");
                return Ok(());
            }
            println!("{:<12} {:<12} {:<12}", "阶段", "依赖", "条件");
            println!("{}", "-".repeat(40));
            for (phase, rule) in rules {
                let marker = match rule.condition {
                    GateCondition::Unrecognized(_) => " (无法识别，放行)",
                    GateCondition::Complete => "",
                };
                println!(
                    "{:<12} {:<12} {:<12}{marker}",
                    phase,
                    rule.dependency,
                    rule.condition.to_string()
                );
            }
        }
        GateActions::Remove { phase } => {
            if control.gate.remove_rule(&phase).await? {
                println!("已删除阶段 {phase} 的闸门规则");
            } else {
                println!("阶段 {phase} 没有闸门规则");
            }
        }
    }

    Ok(())
}

fn print_jobs_table<'a>(jobs: impl Iterator<Item = (&'a Job, Option<i64>)>) {
    println!(
        "{:<36} {:<24} {:<6} {:<6} {:<20}",
        "ID", "工作流", "方式", "重试", "就绪时间"
    );
    println!("{}", "-".repeat(96));
    for (job, ready_at) in jobs {
        println!(
            "{:<36} {:<24} {:<6} {:<6} {:<20}",
            job.id,
            job.workflow,
            job.mode.as_str(),
            job.retry_count,
            ready_at.map(format_millis).unwrap_or_else(|| "-".to_string())
        );
    }
}

fn print_batch_config(config: &BatchSizingConfig) -> Result<()> {
    for field in BatchSizingConfig::FIELDS {
        println!("  {:<24} {}", field, config.get_field(field)?);
    }
    Ok(())
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
