use crate::worker::{InvocationSpec, WorkerRequest};

pub const RUN_ID_FLAG: &str = "--run_id";

pub fn build_invocation(request: &WorkerRequest) -> InvocationSpec {
    let script = request.worker.script.display().to_string();
    let mut args = Vec::new();
    let program = match &request.worker.interpreter {
        Some(interpreter) => {
            args.push(script);
            interpreter.clone()
        }
        None => script,
    };
    args.push(RUN_ID_FLAG.to_string());
    args.push(request.run_id.to_string());

    let mut env = request.worker.env.clone();
    env.extend(
        request
            .run_env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );

    // The query lives only in this child's environment. Without one, any value
    // inherited from the parent is stripped so the worker sees no query at all.
    let mut env_remove = Vec::new();
    match &request.query {
        Some(query) => {
            env.insert(request.query_env.clone(), query.clone());
        }
        None => {
            env.remove(&request.query_env);
            env_remove.push(request.query_env.clone());
        }
    }

    InvocationSpec {
        program,
        args,
        cwd: request.worker.cwd.clone(),
        env,
        env_remove,
    }
}
